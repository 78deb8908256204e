pub mod inspect;
pub mod package;
pub mod sheet;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::cells::schema::CellMapDef;
use crate::cells::{CellRef, Slot};
use crate::error::MtcError;
use crate::model::Certificate;

/// One value bound for one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub slot: Slot,
    pub cell: CellRef,
    pub value: String,
}

/// What a write-back did.
#[derive(Debug, Clone, Serialize)]
pub struct WriteSummary {
    pub path: PathBuf,
    pub sheet: String,
    pub written: Vec<Assignment>,
    /// Mapped slots with no value; their cells were left as they were.
    pub skipped: Vec<Slot>,
}

impl Certificate {
    /// The value for a slot, if the certificate has one.
    pub fn value(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::TensileStrength => self.tensile.as_ref()?.tensile_strength.as_deref(),
            Slot::YieldStrength => self.tensile.as_ref()?.yield_strength.as_deref(),
            Slot::Elongation => self.tensile.as_ref()?.elongation.as_deref(),
            Slot::Hardness(i) => self.hardness.as_ref()?.values.get(i).map(String::as_str),
            Slot::Microstructure(field) => self.microstructure.as_ref()?.get(field),
        }
    }

    /// Split the cell map into cells to write and slots to skip. Hardness
    /// readings beyond the mapped cells are not written.
    pub fn assignments(
        &self,
        map: &CellMapDef,
    ) -> Result<(Vec<Assignment>, Vec<Slot>), MtcError> {
        let mut writes = Vec::new();
        let mut skipped = Vec::new();

        for (slot, cell) in map.slots()? {
            match self.value(slot) {
                Some(value) => writes.push(Assignment {
                    slot,
                    cell,
                    value: value.to_string(),
                }),
                None => skipped.push(slot),
            }
        }

        Ok((writes, skipped))
    }
}

/// Open the destination for writing, classifying the failure.
fn open_destination(dest: &Path) -> Result<File, MtcError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(dest)
        .map_err(|e| {
            // 32/33: Windows sharing and lock violations (file open in Excel).
            let locked = e.kind() == std::io::ErrorKind::PermissionDenied
                || matches!(e.raw_os_error(), Some(32) | Some(33));
            if e.kind() == std::io::ErrorKind::NotFound {
                MtcError::DestinationNotFound {
                    path: dest.to_path_buf(),
                }
            } else if locked {
                MtcError::DestinationLocked {
                    path: dest.to_path_buf(),
                }
            } else {
                MtcError::WriteFailure {
                    path: dest.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        })
}

fn save(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.set_len(0)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Write every present certificate value into its mapped cell and save the
/// workbook in place.
///
/// Absent values are skipped and their cells keep their prior content. The
/// file is opened once and written once; a failure while saving is not
/// rolled back.
pub fn write_certificate(
    dest: &Path,
    certificate: &Certificate,
    map: &CellMapDef,
) -> Result<WriteSummary, MtcError> {
    let (writes, skipped) = certificate.assignments(map)?;

    let mut file = open_destination(dest)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| MtcError::Io(e).for_destination(dest))?;

    let sheet = package::locate_sheet(&bytes, map.sheet.as_deref())
        .map_err(|e| e.for_destination(dest))?;

    if !writes.is_empty() {
        let xml = package::read_sheet_xml(&bytes, &sheet).map_err(|e| e.for_destination(dest))?;
        let cells: Vec<(CellRef, String)> = writes
            .iter()
            .map(|a| (a.cell, a.value.clone()))
            .collect();
        let patched = sheet::set_cells(&xml, &cells).map_err(|e| e.for_destination(dest))?;
        let out = package::replace_part(&bytes, &sheet.part, patched.as_bytes())
            .map_err(|e| e.for_destination(dest))?;

        save(&mut file, &out).map_err(|e| MtcError::Io(e).for_destination(dest))?;
    } else {
        debug!(path = %dest.display(), "no values to write, workbook left unchanged");
    }

    info!(
        path = %dest.display(),
        sheet = %sheet.name,
        written = writes.len(),
        skipped = skipped.len(),
        "certificate written"
    );

    Ok(WriteSummary {
        path: dest.to_path_buf(),
        sheet: sheet.name,
        written: writes,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::builtin::default_cell_map;
    use crate::model::{HardnessResult, MicroField, MicrostructureResult, TensileResult};

    fn certificate() -> Certificate {
        let mut micro = MicrostructureResult::default();
        for field in MicroField::ALL {
            micro.values.insert(field, None);
        }
        micro
            .values
            .insert(MicroField::GraphiteForm, Some("VI (95%)".into()));

        Certificate {
            microstructure: Some(micro),
            tensile: Some(TensileResult {
                tensile_strength: Some("450.2".into()),
                yield_strength: None,
                elongation: Some("12".into()),
                evidence: Vec::new(),
            }),
            hardness: Some(HardnessResult {
                values: vec!["210".into(), "205".into(), "199".into()],
                evidence: Vec::new(),
            }),
        }
    }

    #[test]
    fn test_assignments_default_map() {
        let map = default_cell_map().unwrap();
        let (writes, skipped) = certificate().assignments(&map).unwrap();

        let cells: Vec<String> = writes.iter().map(|a| a.cell.to_string()).collect();
        assert_eq!(cells, vec!["E26", "E28", "E29", "E30", "T39"]);
        assert_eq!(writes[0].value, "450.2");
        assert_eq!(writes[3].value, "205");
        assert_eq!(skipped.len(), 6);
        assert!(skipped.contains(&Slot::YieldStrength));
    }

    #[test]
    fn test_failed_pipelines_write_nothing() {
        let map = default_cell_map().unwrap();
        let (writes, skipped) = Certificate::default().assignments(&map).unwrap();
        assert!(writes.is_empty());
        assert_eq!(skipped.len(), 11);
    }

    #[test]
    fn test_missing_destination() {
        let map = default_cell_map().unwrap();
        let err = write_certificate(Path::new("/no/such/mtc.xlsx"), &certificate(), &map)
            .unwrap_err();
        assert!(matches!(err, MtcError::DestinationNotFound { .. }));
    }

    #[test]
    fn test_not_a_workbook() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"plain text").unwrap();
        let map = default_cell_map().unwrap();
        let err = write_certificate(tmp.path(), &certificate(), &map).unwrap_err();
        assert!(matches!(err, MtcError::WriteFailure { .. }));
    }
}
