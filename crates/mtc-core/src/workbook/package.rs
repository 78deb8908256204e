//! xlsx package access: locating a worksheet part and rewriting the zip with
//! one part replaced.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, trace};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::MtcError;

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";

/// A worksheet as listed in the workbook, with the zip part holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub part: String,
}

type Package<'a> = ZipArchive<Cursor<&'a [u8]>>;

fn open_package(bytes: &[u8]) -> Result<Package<'_>, MtcError> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| MtcError::Workbook(format!("not an xlsx package: {e}")))
}

fn read_part(archive: &mut Package<'_>, name: &str) -> Result<String, MtcError> {
    let mut part = archive
        .by_name(name)
        .map_err(|e| MtcError::Workbook(format!("missing {name}: {e}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| MtcError::Workbook(format!("failed to read {name}: {e}")))?;
    Ok(xml)
}

fn attr(e: &BytesStart, matches: impl Fn(&[u8]) -> bool) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| matches(a.key.as_ref()))
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> MtcError {
    MtcError::Workbook(format!("malformed {part}: {e}"))
}

/// `(name, relationship id)` of each sheet plus the active tab index.
fn parse_workbook(xml: &str) -> Result<(Vec<(String, String)>, usize), MtcError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    let mut active = 0;

    loop {
        match reader.read_event().map_err(|e| xml_error(WORKBOOK_PART, e))? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let name = attr(&e, |k| k == b"name");
                    // r:id, whatever the relationships prefix is called.
                    let rid = attr(&e, |k| k.ends_with(b":id"));
                    if let (Some(name), Some(rid)) = (name, rid) {
                        sheets.push((name, rid));
                    }
                }
                b"workbookView" => {
                    if let Some(tab) = attr(&e, |k| k == b"activeTab") {
                        active = tab.trim().parse().unwrap_or(0);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((sheets, active))
}

/// Relationship id -> part path inside the package.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, MtcError> {
    let mut reader = Reader::from_str(xml);
    let mut targets = HashMap::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| xml_error(WORKBOOK_RELS_PART, e))?
        {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) =
                    (attr(&e, |k| k == b"Id"), attr(&e, |k| k == b"Target"))
                {
                    targets.insert(id, resolve_target(&target));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(targets)
}

/// Targets are relative to `xl/` unless absolute within the package.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

/// All worksheets in tab order, and the index of the active one.
pub fn list_sheets(bytes: &[u8]) -> Result<(Vec<SheetEntry>, usize), MtcError> {
    let mut archive = open_package(bytes)?;
    let (sheets, active) = parse_workbook(&read_part(&mut archive, WORKBOOK_PART)?)?;
    let targets = parse_relationships(&read_part(&mut archive, WORKBOOK_RELS_PART)?)?;

    let entries = sheets
        .into_iter()
        .filter_map(|(name, rid)| {
            let part = targets.get(&rid)?.clone();
            Some(SheetEntry { name, part })
        })
        .collect();
    Ok((entries, active))
}

/// The sheet named `wanted`, or the active sheet when `wanted` is `None`.
pub fn locate_sheet(bytes: &[u8], wanted: Option<&str>) -> Result<SheetEntry, MtcError> {
    let (sheets, active) = list_sheets(bytes)?;

    let found = match wanted {
        Some(name) => sheets.iter().find(|s| s.name == name).cloned(),
        None => sheets.get(active).or_else(|| sheets.first()).cloned(),
    };

    match found {
        Some(sheet) => {
            trace!(sheet = %sheet.name, part = %sheet.part, "located worksheet");
            Ok(sheet)
        }
        None => {
            let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
            Err(MtcError::Workbook(match wanted {
                Some(name) => format!(
                    "no worksheet named '{}'. Available: {}",
                    name,
                    names.join(", ")
                ),
                None => "workbook contains no worksheets".into(),
            }))
        }
    }
}

/// Read one part of the package as text.
pub fn read_sheet_xml(bytes: &[u8], sheet: &SheetEntry) -> Result<String, MtcError> {
    let mut archive = open_package(bytes)?;
    read_part(&mut archive, &sheet.part)
}

/// Rebuild the package with `part` replaced by `content`. Every other entry
/// is copied with its content and compression method unchanged.
pub fn replace_part(bytes: &[u8], part: &str, content: &[u8]) -> Result<Vec<u8>, MtcError> {
    let mut archive = open_package(bytes)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(bytes.len())));
    let mut replaced = false;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| MtcError::Workbook(format!("entry {i}: {e}")))?;
        let name = entry.name().to_string();
        let method = match entry.compression() {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let opts = SimpleFileOptions::default().compression_method(method);

        if entry.is_dir() {
            writer
                .add_directory(name.as_str(), opts)
                .map_err(|e| MtcError::Workbook(e.to_string()))?;
            continue;
        }

        let data = if name.replace('\\', "/") == part {
            replaced = true;
            content.to_vec()
        } else {
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| MtcError::Workbook(format!("read {name}: {e}")))?;
            data
        };

        writer
            .start_file(name.as_str(), opts)
            .map_err(|e| MtcError::Workbook(e.to_string()))?;
        writer.write_all(&data)?;
    }

    if !replaced {
        return Err(MtcError::Workbook(format!("package has no part {part}")));
    }

    let out = writer
        .finish()
        .map_err(|e| MtcError::Workbook(e.to_string()))?
        .into_inner();
    debug!(part, entries = archive.len(), bytes = out.len(), "rebuilt package");
    Ok(out)
}
