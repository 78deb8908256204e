pub mod builtin;
pub mod schema;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MtcError;
use crate::model::MicroField;
use schema::CellMapDef;

/// A zero-based (row, column) cell position parsed from an A1 reference.
///
/// Ordering is row-major, matching the order cells appear in a worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

/// Largest column (XFD) and row an xlsx worksheet allows.
const MAX_COL: u32 = 16_384;
const MAX_ROW: u32 = 1_048_576;

impl CellRef {
    /// Parse an A1-style reference such as `E26` or `$T$41`.
    pub fn parse(a1: &str) -> Option<CellRef> {
        let s = a1.trim().replace('$', "");
        let split = s.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }

        let mut col: u32 = 0;
        for c in letters.chars() {
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
            if col > MAX_COL {
                return None;
            }
        }

        let row: u32 = digits.parse().ok()?;
        if row == 0 || row > MAX_ROW {
            return None;
        }

        Some(CellRef {
            row: row - 1,
            col: col - 1,
        })
    }

    /// Column letters for this cell (`4` -> `E`).
    pub fn column_name(&self) -> String {
        let mut n = self.col + 1;
        let mut name = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            name.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        name.reverse();
        String::from_utf8_lossy(&name).into_owned()
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_name(), self.row + 1)
    }
}

impl Serialize for CellRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A certificate value position the cell map can bind to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    TensileStrength,
    YieldStrength,
    Elongation,
    /// Zero-based hardness reading index.
    Hardness(usize),
    Microstructure(MicroField),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::TensileStrength => f.write_str("Tensile strength"),
            Slot::YieldStrength => f.write_str("Yield strength"),
            Slot::Elongation => f.write_str("Elongation"),
            Slot::Hardness(i) => write!(f, "Hardness #{}", i + 1),
            Slot::Microstructure(field) => f.write_str(field.label()),
        }
    }
}

impl CellMapDef {
    /// Every mapped slot with its parsed cell, in certificate order:
    /// tensile, hardness, microstructure.
    pub fn slots(&self) -> Result<Vec<(Slot, CellRef)>, MtcError> {
        let tensile = [
            (Slot::TensileStrength, &self.tensile.tensile_strength),
            (Slot::YieldStrength, &self.tensile.yield_strength),
            (Slot::Elongation, &self.tensile.elongation),
        ];

        let mut out = Vec::new();
        for (slot, cell) in tensile {
            if let Some(cell) = cell {
                out.push((slot, parse_cell(slot, cell)?));
            }
        }
        for (i, cell) in self.hardness.iter().enumerate() {
            let slot = Slot::Hardness(i);
            out.push((slot, parse_cell(slot, cell)?));
        }
        for field in MicroField::ALL {
            if let Some(cell) = self.microstructure.get(&field) {
                let slot = Slot::Microstructure(field);
                out.push((slot, parse_cell(slot, cell)?));
            }
        }
        Ok(out)
    }
}

fn parse_cell(slot: Slot, cell: &str) -> Result<CellRef, MtcError> {
    CellRef::parse(cell).ok_or_else(|| {
        MtcError::CellMapInvalid(format!("'{}' for {} is not a valid cell reference", cell, slot))
    })
}

/// Load a cell map from a JSON file.
pub fn load_cell_map(path: &Path) -> Result<CellMapDef, MtcError> {
    let content = std::fs::read_to_string(path).map_err(|e| MtcError::CellMapLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_cell_map(&content, path)
}

/// Parse a cell map from a JSON string read from `source`.
pub fn parse_cell_map(json: &str, source: &Path) -> Result<CellMapDef, MtcError> {
    let map: CellMapDef = serde_json::from_str(json).map_err(|e| MtcError::CellMapLoad {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })?;
    validate_cell_map(&map)?;
    Ok(map)
}

/// Parse a cell map from a JSON string (no file path context).
pub fn parse_cell_map_str(json: &str) -> Result<CellMapDef, MtcError> {
    let map: CellMapDef = serde_json::from_str(json).map_err(MtcError::Json)?;
    validate_cell_map(&map)?;
    Ok(map)
}

/// Validate that a cell map is well-formed: every cell parses and no cell is
/// bound twice. Unknown microstructure labels are already rejected when the
/// JSON is deserialized.
pub fn validate_cell_map(map: &CellMapDef) -> Result<(), MtcError> {
    if map.name.trim().is_empty() {
        return Err(MtcError::CellMapInvalid("name must not be empty".into()));
    }

    if let Some(sheet) = &map.sheet {
        if sheet.trim().is_empty() {
            return Err(MtcError::CellMapInvalid(
                "sheet must not be empty when given".into(),
            ));
        }
    }

    let slots = map.slots()?;
    if slots.is_empty() {
        return Err(MtcError::CellMapInvalid("no cells are mapped".into()));
    }

    let mut seen: HashMap<CellRef, Slot> = HashMap::new();
    for (slot, cell) in slots {
        if let Some(previous) = seen.insert(cell, slot) {
            return Err(MtcError::CellMapInvalid(format!(
                "cell {} is assigned to both {} and {}",
                cell, previous, slot
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_ref_parse() {
        assert_eq!(CellRef::parse("E26"), Some(CellRef { row: 25, col: 4 }));
        assert_eq!(CellRef::parse("t41"), Some(CellRef { row: 40, col: 19 }));
        assert_eq!(CellRef::parse("$AA$1"), Some(CellRef { row: 0, col: 26 }));
        assert_eq!(CellRef::parse("E0"), None);
        assert_eq!(CellRef::parse("26"), None);
        assert_eq!(CellRef::parse("E"), None);
        assert_eq!(CellRef::parse("E2x"), None);
        assert_eq!(CellRef::parse("XFE1"), None);
    }

    #[test]
    fn test_cell_ref_display() {
        for a1 in ["A1", "E26", "T41", "Z9", "AA10", "XFD1048576"] {
            assert_eq!(CellRef::parse(a1).unwrap().to_string(), a1);
        }
    }

    #[test]
    fn test_row_major_order() {
        let mut cells = vec![
            CellRef::parse("T36").unwrap(),
            CellRef::parse("E27").unwrap(),
            CellRef::parse("E26").unwrap(),
            CellRef::parse("A27").unwrap(),
        ];
        cells.sort();
        let names: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["E26", "A27", "E27", "T36"]);
    }

    #[test]
    fn test_parse_valid_cell_map() {
        let json = r#"{
            "name": "Test",
            "sheet": "MTC",
            "tensile": { "tensile_strength": "B2" },
            "hardness": ["C3"],
            "microstructure": { "Graphite Size": "D4" }
        }"#;
        let map = parse_cell_map_str(json).unwrap();
        let slots = map.slots().unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].0, Slot::TensileStrength);
        assert_eq!(slots[1], (Slot::Hardness(0), CellRef { row: 2, col: 2 }));
        assert_eq!(slots[2].0, Slot::Microstructure(MicroField::GraphiteSize));
    }

    #[test]
    fn test_duplicate_cell_rejected() {
        let json = r#"{
            "name": "Dup",
            "tensile": { "tensile_strength": "E26", "yield_strength": "e26" }
        }"#;
        let err = parse_cell_map_str(json).unwrap_err();
        assert!(err.to_string().contains("E26"));
    }

    #[test]
    fn test_invalid_cell_rejected() {
        let json = r#"{ "name": "Bad", "hardness": ["29E"] }"#;
        assert!(matches!(
            parse_cell_map_str(json),
            Err(MtcError::CellMapInvalid(_))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{ "name": "Bad", "microstructure": { "Carbon Equivalent": "A1" } }"#;
        assert!(matches!(parse_cell_map_str(json), Err(MtcError::Json(_))));
    }

    #[test]
    fn test_empty_map_rejected() {
        assert!(parse_cell_map_str(r#"{ "name": "Empty" }"#).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_cell_map(Path::new("/no/such/cells.json")).unwrap_err();
        assert!(matches!(err, MtcError::CellMapLoad { .. }));
    }

    #[test]
    fn test_slot_display() {
        assert_eq!(Slot::Hardness(1).to_string(), "Hardness #2");
        assert_eq!(
            Slot::Microstructure(MicroField::GraphiteForm).to_string(),
            "Graphite Form"
        );
    }
}
