use std::io::Cursor;
use std::path::Path;

use calamine::{Reader, Xlsx};
use serde::Serialize;

use crate::cells::schema::CellMapDef;
use crate::cells::{CellRef, Slot};
use crate::error::MtcError;
use crate::workbook::package;

/// A mapped cell as currently stored in a workbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectedCell {
    pub slot: Slot,
    pub cell: CellRef,
    pub value: Option<String>,
}

/// Read the mapped cells of a certificate workbook.
pub fn inspect_certificate(
    path: &Path,
    map: &CellMapDef,
) -> Result<Vec<InspectedCell>, MtcError> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MtcError::DestinationNotFound {
                path: path.to_path_buf(),
            }
        } else {
            MtcError::SourceUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;
    inspect_bytes(&bytes, map).map_err(|e| e.for_source(path))
}

/// Same as [`inspect_certificate`] for an in-memory workbook.
pub fn inspect_bytes(bytes: &[u8], map: &CellMapDef) -> Result<Vec<InspectedCell>, MtcError> {
    let sheet = package::locate_sheet(bytes, map.sheet.as_deref())?;

    let cursor = Cursor::new(bytes);
    let mut workbook: Xlsx<_> = calamine::open_workbook_from_rs(cursor)
        .map_err(|e| MtcError::Workbook(format!("failed to open xlsx: {e}")))?;
    let range = workbook
        .worksheet_range(&sheet.name)
        .map_err(|e| MtcError::Workbook(format!("sheet '{}' not readable: {e}", sheet.name)))?;

    Ok(map
        .slots()?
        .into_iter()
        .map(|(slot, cell)| InspectedCell {
            slot,
            cell,
            value: range.get_value((cell.row, cell.col)).and_then(cell_as_string),
        })
        .collect())
}

fn cell_as_string(cell: &calamine::Data) -> Option<String> {
    match cell {
        calamine::Data::String(s) if s.is_empty() => None,
        calamine::Data::String(s) => Some(s.clone()),
        calamine::Data::Float(f) => Some(f.to_string()),
        calamine::Data::Int(i) => Some(i.to_string()),
        calamine::Data::DateTime(dt) => Some(dt.to_string()),
        calamine::Data::Empty => None,
        _ => Some(format!("{cell}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::builtin::default_cell_map;
    use rust_xlsxwriter::Workbook;

    #[test]
    fn test_inspect_reads_mapped_cells() {
        let tmp = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(25, 4, "512").unwrap();
        sheet.write_number(28, 4, 210.0).unwrap();
        sheet.write_string(40, 19, "90%/10%").unwrap();
        workbook.save(tmp.path()).unwrap();

        let map = default_cell_map().unwrap();
        let cells = inspect_certificate(tmp.path(), &map).unwrap();
        assert_eq!(cells.len(), 11);
        assert_eq!(cells[0].cell.to_string(), "E26");
        assert_eq!(cells[0].value.as_deref(), Some("512"));
        assert_eq!(cells[1].value, None);
        assert_eq!(cells[3].value.as_deref(), Some("210"));
        assert_eq!(cells[10].value.as_deref(), Some("90%/10%"));
    }

    #[test]
    fn test_inspect_missing_file() {
        let map = default_cell_map().unwrap();
        let err = inspect_certificate(Path::new("/no/such.xlsx"), &map).unwrap_err();
        assert!(matches!(err, MtcError::DestinationNotFound { .. }));
    }
}
