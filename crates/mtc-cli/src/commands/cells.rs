use mtc_core::cells::builtin;
use mtc_core::cells::Slot;
use mtc_core::error::MtcError;
use mtc_core::model::MicroField;
use std::path::Path;

pub fn show() -> Result<(), MtcError> {
    for name in builtin::PRESETS {
        let json = builtin::preset_json(name).ok_or_else(|| {
            MtcError::CellMapInvalid(format!("preset '{name}' has no definition"))
        })?;
        print!("{json}");
        if !json.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

pub fn validate(file: &Path) -> Result<(), MtcError> {
    let map = mtc_core::cells::load_cell_map(file)?;
    let slots = map.slots()?;

    println!("Cell map '{}' is valid.", map.name);
    println!(
        "  Sheet: {}",
        map.sheet.as_deref().unwrap_or("(active sheet)")
    );
    println!("  Cells: {} mapped", slots.len());
    for (slot, cell) in &slots {
        println!("    {:<6} {}", cell.to_string(), slot);
    }

    // Unmapped values are legal, but usually a mistake.
    let mut warnings = Vec::new();
    let tensile = [
        (Slot::TensileStrength, &map.tensile.tensile_strength),
        (Slot::YieldStrength, &map.tensile.yield_strength),
        (Slot::Elongation, &map.tensile.elongation),
    ];
    for (slot, cell) in tensile {
        if cell.is_none() {
            warnings.push(format!("{slot} has no cell and will not be written"));
        }
    }
    for field in MicroField::ALL {
        if !map.microstructure.contains_key(&field) {
            warnings.push(format!("{field} has no cell and will not be written"));
        }
    }
    if map.hardness.is_empty() {
        warnings.push("no hardness cells; hardness readings will not be written".into());
    }

    if !warnings.is_empty() {
        println!("\nWarnings:");
        for w in &warnings {
            println!("  - {}", w);
        }
    }

    Ok(())
}
