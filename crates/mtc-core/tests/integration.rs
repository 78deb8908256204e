//! Integration tests for the extract-then-write flow.
//!
//! Uses a MockExtractor that returns pre-built page layouts without parsing
//! PDF content, so these tests run without poppler-utils. Docx reports and
//! certificate workbooks are generated on the fly.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use mtc_core::cells::builtin::default_cell_map;
use mtc_core::error::MtcError;
use mtc_core::extraction::{BBox, LayoutExtractor, PageLayout, TextBox};
use mtc_core::model::{Certificate, MicroField, TensileResult};
use mtc_core::{inspect_certificate, run_pipelines, write_certificate, SourcePaths};
use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;
use tempfile::TempDir;

/// Picks a layout by the marker written into the fake PDF file.
struct MockExtractor {
    tensile: Vec<TextBox>,
    hardness: Vec<TextBox>,
}

impl LayoutExtractor for MockExtractor {
    fn extract_first_page(&self, pdf_bytes: &[u8]) -> Result<PageLayout, MtcError> {
        match pdf_bytes {
            b"tensile" => Ok(PageLayout::new(self.tensile.clone())),
            b"hardness" => Ok(PageLayout::new(self.hardness.clone())),
            _ => Err(MtcError::Extraction("unrecognized test document".into())),
        }
    }

    fn backend_name(&self) -> &str {
        "mock"
    }
}

fn tb(text: &str, left: f32, bottom: f32, right: f32, top: f32) -> TextBox {
    TextBox::new(text, BBox::new(left, bottom, right, top))
}

fn extractor() -> MockExtractor {
    MockExtractor {
        tensile: vec![
            tb("Tensile Strength", 50.0, 700.0, 150.0, 712.0),
            tb("450.2 Mpa", 300.0, 701.0, 360.0, 711.0),
            tb("Yield Strength", 50.0, 680.0, 140.0, 692.0),
            tb("Elongation", 50.0, 660.0, 120.0, 672.0),
            tb("12%", 300.0, 660.0, 330.0, 672.0),
        ],
        hardness: vec![
            tb("Hardness (surface)", 50.0, 500.0, 150.0, 512.0),
            tb("210 HBW", 200.0, 500.0, 250.0, 512.0),
            tb("Hardness (core)", 50.0, 400.0, 140.0, 412.0),
            tb("205 HBW", 200.0, 401.0, 250.0, 411.0),
        ],
    }
}

fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn docx(dir: &TempDir, name: &str, tokens: &[&str]) -> PathBuf {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
    );
    for token in tokens {
        body.push_str("<w:p><w:r><w:t>");
        body.push_str(&token.replace('&', "&amp;").replace('<', "&lt;"));
        body.push_str("</w:t></w:r></w:p>");
    }
    body.push_str("</w:body></w:document>");

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(body.as_bytes()).unwrap();
    let bytes = zip.finish().unwrap().into_inner();
    write_file(dir, name, &bytes)
}

fn micro_report(dir: &TempDir) -> PathBuf {
    docx(
        dir,
        "micro.docx",
        &[
            "Graphite Nodularity",
            "86%",
            "Nodular Particles per mm²",
            "212",
            "Graphite Size",
            "6 - 7",
            "Graphite Form",
            "VI (95%)",
            "Graphite Fraction",
            "11",
            "%",
            "Ferrite / Pearlite Ratio",
            "92%",
            "/ 8%",
        ],
    )
}

const MAPPED: [(u32, u16); 11] = [
    (25, 4),
    (26, 4),
    (27, 4),
    (28, 4),
    (29, 4),
    (35, 19),
    (36, 19),
    (37, 19),
    (38, 19),
    (39, 19),
    (40, 19),
];

/// A certificate template with every mapped cell pre-filled with "old".
fn template(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("mtc.xlsx");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Material Test Certificate").unwrap();
    for (row, col) in MAPPED {
        sheet.write_string(row, col, "old").unwrap();
    }
    sheet.write_number(25, 5, 400.0).unwrap();
    workbook.save(&path).unwrap();
    path
}

fn cell_values(path: &Path) -> Vec<(String, Option<String>)> {
    let map = default_cell_map().unwrap();
    inspect_certificate(path, &map)
        .unwrap()
        .into_iter()
        .map(|c| (c.cell.to_string(), c.value))
        .collect()
}

// ---------------------------------------------------------------------------
// Test 1: All three pipelines feed the default cell map
// ---------------------------------------------------------------------------
#[test]
fn end_to_end_fill() {
    let dir = TempDir::new().unwrap();
    let sources = SourcePaths {
        microstructure: Some(micro_report(&dir)),
        tensile: Some(write_file(&dir, "tensile.pdf", b"tensile")),
        hardness: Some(write_file(&dir, "hardness.pdf", b"hardness")),
    };
    let workbook = template(&dir);

    let results = run_pipelines(&sources, &extractor());
    assert!(results.errors().is_empty());

    let map = default_cell_map().unwrap();
    let summary = write_certificate(&workbook, &results.certificate(), &map).unwrap();
    assert_eq!(summary.written.len(), 10);
    assert_eq!(summary.skipped.len(), 1);

    let old = Some("old".to_string());
    assert_eq!(
        cell_values(&workbook),
        vec![
            ("E26".to_string(), Some("450.2".to_string())),
            ("E27".to_string(), old),
            ("E28".to_string(), Some("12".to_string())),
            ("E29".to_string(), Some("210".to_string())),
            ("E30".to_string(), Some("205".to_string())),
            ("T36".to_string(), Some("86%".to_string())),
            ("T37".to_string(), Some("212".to_string())),
            ("T38".to_string(), Some("6 - 7".to_string())),
            ("T39".to_string(), Some("VI (95%)".to_string())),
            ("T40".to_string(), Some("11%".to_string())),
            ("T41".to_string(), Some("92%/ 8%".to_string())),
        ]
    );
}

// ---------------------------------------------------------------------------
// Test 2: Only present values overwrite cells
// ---------------------------------------------------------------------------
#[test]
fn partial_update_touches_only_present_values() {
    let dir = TempDir::new().unwrap();
    let workbook = template(&dir);
    let certificate = Certificate {
        tensile: Some(TensileResult {
            tensile_strength: Some("512".into()),
            yield_strength: None,
            elongation: Some("9.5".into()),
            evidence: Vec::new(),
        }),
        ..Certificate::default()
    };

    let map = default_cell_map().unwrap();
    write_certificate(&workbook, &certificate, &map).unwrap();

    let values = cell_values(&workbook);
    let changed: Vec<&str> = values
        .iter()
        .filter(|(_, v)| v.as_deref() != Some("old"))
        .map(|(cell, _)| cell.as_str())
        .collect();
    assert_eq!(changed, vec!["E26", "E28"]);
    assert_eq!(values[0].1.as_deref(), Some("512"));
    assert_eq!(values[2].1.as_deref(), Some("9.5"));
}

// ---------------------------------------------------------------------------
// Test 3: Nothing found leaves the file byte-for-byte unchanged
// ---------------------------------------------------------------------------
#[test]
fn empty_certificate_leaves_workbook_unchanged() {
    let dir = TempDir::new().unwrap();
    let workbook = template(&dir);
    let before = std::fs::read(&workbook).unwrap();

    let map = default_cell_map().unwrap();
    let summary = write_certificate(&workbook, &Certificate::default(), &map).unwrap();
    assert!(summary.written.is_empty());
    assert_eq!(std::fs::read(&workbook).unwrap(), before);
}

// ---------------------------------------------------------------------------
// Test 4: One failing pipeline does not stop the others
// ---------------------------------------------------------------------------
#[test]
fn pipeline_failures_are_isolated() {
    let dir = TempDir::new().unwrap();
    let sources = SourcePaths {
        microstructure: Some(write_file(&dir, "micro.docx", b"not a zip")),
        tensile: Some(dir.path().join("missing.pdf")),
        hardness: Some(write_file(&dir, "hardness.pdf", b"hardness")),
    };

    let results = run_pipelines(&sources, &extractor());
    assert!(matches!(
        results.microstructure,
        Some(Err(MtcError::SourceUnreadable { .. }))
    ));
    assert!(matches!(
        results.tensile,
        Some(Err(MtcError::SourceNotFound { .. }))
    ));
    assert_eq!(results.errors().len(), 2);

    let certificate = results.certificate();
    assert!(certificate.microstructure.is_none());
    assert!(certificate.tensile.is_none());
    assert_eq!(certificate.hardness.unwrap().values, vec!["210", "205"]);
}

#[test]
fn unreadable_pdf_maps_to_source_unreadable() {
    let dir = TempDir::new().unwrap();
    let sources = SourcePaths {
        tensile: Some(write_file(&dir, "tensile.pdf", b"%PDF-garbage")),
        ..SourcePaths::default()
    };

    let results = run_pipelines(&sources, &extractor());
    assert!(results.microstructure.is_none());
    assert!(results.hardness.is_none());
    match results.tensile {
        Some(Err(MtcError::SourceUnreadable { path, .. })) => {
            assert!(path.ends_with("tensile.pdf"))
        }
        other => panic!("expected SourceUnreadable, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test 5: Fields without a label in the report stay absent
// ---------------------------------------------------------------------------
#[test]
fn microstructure_missing_fields_stay_absent() {
    let dir = TempDir::new().unwrap();
    let path = docx(&dir, "micro.docx", &["Graphite Form", "Form", "III (100%)"]);

    let result = mtc_core::extract_microstructure(&path).unwrap();
    assert_eq!(result.get(MicroField::GraphiteForm), Some("III (100%)"));
    assert_eq!(result.get(MicroField::GraphiteNodularity), None);
    assert_eq!(result.found_count(), 1);
    assert_eq!(result.values.len(), 6);
}

// ---------------------------------------------------------------------------
// Test 6: Destination errors
// ---------------------------------------------------------------------------
#[test]
fn missing_destination() {
    let dir = TempDir::new().unwrap();
    let map = default_cell_map().unwrap();
    let err = write_certificate(&dir.path().join("nope.xlsx"), &Certificate::default(), &map)
        .unwrap_err();
    assert!(matches!(err, MtcError::DestinationNotFound { .. }));
}

#[test]
fn read_only_destination_is_locked() {
    let dir = TempDir::new().unwrap();
    let workbook = template(&dir);
    let mut perms = std::fs::metadata(&workbook).unwrap().permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(&workbook, perms).unwrap();

    let map = default_cell_map().unwrap();
    match write_certificate(&workbook, &Certificate::default(), &map) {
        Err(MtcError::DestinationLocked { path }) => assert_eq!(path, workbook),
        // Privileged users can open read-only files for writing.
        Ok(_) => {}
        Err(other) => panic!("expected DestinationLocked, got {other:?}"),
    }
}
