use mtc_core::model::{Certificate, HardnessResult, MicroField, MicrostructureResult, TensileResult};
use mtc_core::trace::Evidence;
use mtc_core::workbook::inspect::InspectedCell;
use mtc_core::workbook::WriteSummary;
use std::path::Path;

use crate::commands::fill::PipelineFailure;

const NOT_FOUND: &str = "-";

fn print_rows(rows: &[(String, Option<&str>)]) {
    let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(10);
    for (name, value) in rows {
        println!(
            "  {:<width$}  {}",
            name,
            value.unwrap_or(NOT_FOUND),
            width = width
        );
    }
}

pub fn print_microstructure(result: &MicrostructureResult, verbose: bool) {
    println!("=== Microstructure ===\n");
    let rows: Vec<(String, Option<&str>)> = MicroField::ALL
        .iter()
        .map(|f| (f.label().to_string(), result.get(*f)))
        .collect();
    print_rows(&rows);
    println!(
        "\n  {} of {} fields found",
        result.found_count(),
        MicroField::ALL.len()
    );

    if verbose {
        print_evidence(&result.evidence);
    }
}

pub fn print_tensile(result: &TensileResult, verbose: bool) {
    println!("=== Tensile ===\n");
    print_rows(&[
        ("Tensile strength".into(), result.tensile_strength.as_deref()),
        ("Yield strength".into(), result.yield_strength.as_deref()),
        ("Elongation".into(), result.elongation.as_deref()),
    ]);

    if verbose {
        print_evidence(&result.evidence);
    }
}

pub fn print_hardness(result: &HardnessResult, verbose: bool) {
    println!("=== Hardness ===\n");
    if result.values.is_empty() {
        println!("  No readings found");
    } else {
        let rows: Vec<(String, Option<&str>)> = result
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("#{}", i + 1), Some(v.as_str())))
            .collect();
        print_rows(&rows);
    }

    if verbose {
        print_evidence(&result.evidence);
    }
}

fn print_evidence(evidence: &[Evidence]) {
    if evidence.is_empty() {
        return;
    }
    println!();
    for entry in evidence {
        println!("  {} ({:?})", entry.field, entry.outcome);
        for step in &entry.steps {
            println!("    {:?}: {}", step.step_type, step.message);
        }
    }
}

pub fn print_fill(
    summary: &WriteSummary,
    failed: &[PipelineFailure],
    certificate: Option<&Certificate>,
) {
    println!(
        "=== {} (sheet '{}') ===\n",
        summary.path.display(),
        summary.sheet
    );

    if summary.written.is_empty() {
        println!("  No values written; the workbook is unchanged.\n");
    } else {
        let width = summary
            .written
            .iter()
            .map(|a| a.slot.to_string().len())
            .max()
            .unwrap_or(10);
        for a in &summary.written {
            println!(
                "  {:<6} {:<width$}  {}",
                a.cell.to_string(),
                a.slot.to_string(),
                a.value,
                width = width
            );
        }
        println!();
    }

    if !summary.skipped.is_empty() {
        let names: Vec<String> = summary.skipped.iter().map(|s| s.to_string()).collect();
        println!("  Not found (cells left as they were): {}\n", names.join(", "));
    }

    if !failed.is_empty() {
        println!("  Failed pipelines:");
        for f in failed {
            println!("    {} -> {}", f.pipeline, f.error);
        }
        println!();
    }

    if let Some(certificate) = certificate {
        if let Some(m) = &certificate.microstructure {
            print_evidence(&m.evidence);
        }
        if let Some(t) = &certificate.tensile {
            print_evidence(&t.evidence);
        }
        if let Some(h) = &certificate.hardness {
            print_evidence(&h.evidence);
        }
    }
}

pub fn print_inspect(workbook: &Path, map_name: &str, cells: &[InspectedCell]) {
    println!("=== {} ({}) ===\n", workbook.display(), map_name);
    let width = cells
        .iter()
        .map(|c| c.slot.to_string().len())
        .max()
        .unwrap_or(10);
    for c in cells {
        println!(
            "  {:<6} {:<width$}  {}",
            c.cell.to_string(),
            c.slot.to_string(),
            c.value.as_deref().unwrap_or(NOT_FOUND),
            width = width
        );
    }
}
