//! Streaming cell replacement inside a worksheet part.
//!
//! Events outside the targeted cells are written back as read, so untouched
//! rows, cells, formulas and styles keep their original markup.

use std::collections::BTreeMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::cells::CellRef;
use crate::error::MtcError;

/// Column -> text for the cells of one row that still have to be written.
type RowCells = BTreeMap<u32, String>;

struct Patcher {
    writer: Writer<Vec<u8>>,
    /// Namespace prefix used by the worksheet's own elements, if any.
    prefix: Option<String>,
    pending: BTreeMap<u32, RowCells>,
    row_cells: Option<RowCells>,
    row: u32,
    last_row: Option<u32>,
    last_col: Option<u32>,
}

impl Patcher {
    fn emit(&mut self, event: Event<'_>) -> Result<(), MtcError> {
        self.writer
            .write_event(event)
            .map_err(|e| MtcError::Workbook(format!("failed to write worksheet XML: {e}")))
    }

    fn qualified(&self, name: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{name}"),
            None => name.to_string(),
        }
    }

    /// Zero-based row index of a `<row>`, falling back to the row after the
    /// previous one when `r` is missing.
    fn row_index(&mut self, e: &BytesStart) -> u32 {
        let row = attr(e, b"r")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .map(|n| n - 1)
            .unwrap_or_else(|| self.last_row.map_or(0, |r| r + 1));
        self.last_row = Some(row);
        self.last_col = None;
        self.row = row;
        row
    }

    fn col_index(&mut self, e: &BytesStart) -> u32 {
        let col = attr(e, b"r")
            .and_then(|v| CellRef::parse(&v))
            .map(|c| c.col)
            .unwrap_or_else(|| self.last_col.map_or(0, |c| c + 1));
        self.last_col = Some(col);
        col
    }

    /// Write all pending rows above `limit` (all of them when `None`).
    fn flush_rows(&mut self, limit: Option<u32>) -> Result<(), MtcError> {
        let rows = match limit {
            Some(limit) => {
                let rest = self.pending.split_off(&limit);
                std::mem::replace(&mut self.pending, rest)
            }
            None => std::mem::take(&mut self.pending),
        };
        for (row, cells) in rows {
            self.write_row(row, cells)?;
        }
        Ok(())
    }

    fn write_row(&mut self, row: u32, cells: RowCells) -> Result<(), MtcError> {
        let name = self.qualified("row");
        let number = (row + 1).to_string();
        let mut start = BytesStart::new(name.as_str());
        start.push_attribute(("r", number.as_str()));
        self.emit(Event::Start(start))?;
        for (col, value) in cells {
            self.write_cell(CellRef { row, col }, None, &value)?;
        }
        self.emit(Event::End(BytesEnd::new(name.as_str())))
    }

    /// `<c r=".." s=".." t="inlineStr"><is><t>value</t></is></c>`
    fn write_cell(
        &mut self,
        cell: CellRef,
        style: Option<&str>,
        value: &str,
    ) -> Result<(), MtcError> {
        let c_name = self.qualified("c");
        let is_name = self.qualified("is");
        let t_name = self.qualified("t");
        let reference = cell.to_string();

        let mut c = BytesStart::new(c_name.as_str());
        c.push_attribute(("r", reference.as_str()));
        if let Some(s) = style {
            c.push_attribute(("s", s));
        }
        c.push_attribute(("t", "inlineStr"));
        self.emit(Event::Start(c))?;
        self.emit(Event::Start(BytesStart::new(is_name.as_str())))?;

        let mut t = BytesStart::new(t_name.as_str());
        if value.trim() != value {
            t.push_attribute(("xml:space", "preserve"));
        }
        self.emit(Event::Start(t))?;
        self.emit(Event::Text(BytesText::new(value)))?;
        self.emit(Event::End(BytesEnd::new(t_name.as_str())))?;
        self.emit(Event::End(BytesEnd::new(is_name.as_str())))?;
        self.emit(Event::End(BytesEnd::new(c_name.as_str())))
    }

    /// Write the current row's pending cells left of `col` (all when `None`).
    fn flush_cells(&mut self, col: Option<u32>) -> Result<(), MtcError> {
        let cells = match col {
            Some(col) => match self.row_cells.as_mut() {
                Some(cells) => {
                    let rest = cells.split_off(&col);
                    std::mem::replace(cells, rest)
                }
                None => return Ok(()),
            },
            None => match self.row_cells.take() {
                Some(cells) => cells,
                None => return Ok(()),
            },
        };
        let row = self.row;
        for (c, value) in cells {
            self.write_cell(CellRef { row, col: c }, None, &value)?;
        }
        Ok(())
    }

    /// Take the pending value for `col` of the current row, if any.
    fn take_cell(&mut self, col: u32) -> Option<String> {
        self.row_cells.as_mut().and_then(|cells| cells.remove(&col))
    }
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn qname(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn prefix_of(e: &BytesStart) -> Option<String> {
    e.name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

/// Set `writes` as inline-string cells in a worksheet XML document.
///
/// Existing cells are replaced in place (their style index is kept); missing
/// cells and rows are inserted in row-major position. Nothing else in the
/// document changes.
pub fn set_cells(xml: &str, writes: &[(CellRef, String)]) -> Result<String, MtcError> {
    let mut pending: BTreeMap<u32, RowCells> = BTreeMap::new();
    for (cell, value) in writes {
        pending
            .entry(cell.row)
            .or_default()
            .insert(cell.col, value.clone());
    }

    let mut p = Patcher {
        writer: Writer::new(Vec::with_capacity(xml.len() + 256)),
        prefix: None,
        pending,
        row_cells: None,
        row: 0,
        last_row: None,
        last_col: None,
    };

    let mut reader = Reader::from_str(xml);
    let mut in_sheet_data = false;
    let mut seen_sheet_data = false;
    let mut skipping_cell = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            MtcError::Workbook(format!(
                "malformed worksheet XML at position {}: {e}",
                reader.buffer_position()
            ))
        })?;

        if skipping_cell {
            if let Event::End(e) = &event {
                if e.local_name().as_ref() == b"c" {
                    skipping_cell = false;
                }
            }
            continue;
        }

        match event {
            Event::Eof => break,

            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                p.prefix = prefix_of(&e);
                seen_sheet_data = true;
                in_sheet_data = true;
                p.emit(Event::Start(e))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                p.prefix = prefix_of(&e);
                seen_sheet_data = true;
                if p.pending.is_empty() {
                    p.emit(Event::Empty(e))?;
                } else {
                    let name = qname(&e);
                    p.emit(Event::Start(e))?;
                    p.flush_rows(None)?;
                    p.emit(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"sheetData" => {
                p.flush_rows(None)?;
                in_sheet_data = false;
                p.emit(Event::End(e))?;
            }

            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = p.row_index(&e);
                p.flush_rows(Some(row))?;
                p.row_cells = p.pending.remove(&row);
                p.emit(Event::Start(e))?;
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = p.row_index(&e);
                p.flush_rows(Some(row))?;
                match p.pending.remove(&row) {
                    Some(cells) => {
                        let name = qname(&e);
                        p.emit(Event::Start(e))?;
                        p.row_cells = Some(cells);
                        p.flush_cells(None)?;
                        p.emit(Event::End(BytesEnd::new(name.as_str())))?;
                    }
                    None => p.emit(Event::Empty(e))?,
                }
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                p.flush_cells(None)?;
                p.emit(Event::End(e))?;
            }

            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let col = p.col_index(&e);
                p.flush_cells(Some(col))?;
                match p.take_cell(col) {
                    Some(value) => {
                        let style = attr(&e, b"s");
                        p.write_cell(CellRef { row: p.row, col }, style.as_deref(), &value)?;
                        skipping_cell = true;
                    }
                    None => p.emit(Event::Start(e))?,
                }
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let col = p.col_index(&e);
                p.flush_cells(Some(col))?;
                match p.take_cell(col) {
                    Some(value) => {
                        let style = attr(&e, b"s");
                        p.write_cell(CellRef { row: p.row, col }, style.as_deref(), &value)?;
                    }
                    None => p.emit(Event::Empty(e))?,
                }
            }

            other => p.emit(other)?,
        }
    }

    if !seen_sheet_data {
        return Err(MtcError::Workbook(
            "worksheet has no sheetData element".into(),
        ));
    }

    String::from_utf8(p.writer.into_inner())
        .map_err(|e| MtcError::Workbook(format!("worksheet XML is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:F30"/><sheetData><row r="26" spans="1:6"><c r="A26" t="s"><v>0</v></c><c r="E26" s="4" t="s"><v>1</v></c><c r="F26"><f>SUM(A1:A2)</f><v>3</v></c></row><row r="28"><c r="E28" s="2"/></row><row r="30"><c r="B30"><v>7</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells></worksheet>"#;

    fn writes(items: &[(&str, &str)]) -> Vec<(CellRef, String)> {
        items
            .iter()
            .map(|(a1, v)| (CellRef::parse(a1).unwrap(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_replace_existing_cell_keeps_style() {
        let out = set_cells(SHEET, &writes(&[("E26", "450.2")])).unwrap();
        assert!(out.contains(r#"<c r="E26" s="4" t="inlineStr"><is><t>450.2</t></is></c>"#));
        assert!(!out.contains(r#"<v>1</v>"#));
    }

    #[test]
    fn test_untouched_markup_is_identical() {
        let out = set_cells(SHEET, &writes(&[("E26", "450.2")])).unwrap();
        assert!(out.contains(r#"<row r="26" spans="1:6"><c r="A26" t="s"><v>0</v></c>"#));
        assert!(out.contains(r#"<c r="F26"><f>SUM(A1:A2)</f><v>3</v></c></row>"#));
        assert!(out.contains(r#"<row r="28"><c r="E28" s="2"/></row>"#));
        assert!(out.ends_with(r#"<mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells></worksheet>"#));
    }

    #[test]
    fn test_no_writes_round_trips() {
        assert_eq!(set_cells(SHEET, &[]).unwrap(), SHEET);
    }

    #[test]
    fn test_replace_empty_cell() {
        let out = set_cells(SHEET, &writes(&[("E28", "12")])).unwrap();
        assert!(out.contains(r#"<row r="28"><c r="E28" s="2" t="inlineStr"><is><t>12</t></is></c></row>"#));
    }

    #[test]
    fn test_insert_cells_and_rows_in_order() {
        let out = set_cells(
            SHEET,
            &writes(&[("E29", "210"), ("C26", "x"), ("T41", "50%/50%"), ("A27", "y")]),
        )
        .unwrap();

        let c26 = out.find(r#"r="C26""#).unwrap();
        assert!(out.find(r#"r="A26""#).unwrap() < c26);
        assert!(c26 < out.find(r#"r="E26""#).unwrap());

        let row27 = out.find(r#"<row r="27">"#).unwrap();
        assert!(out.find("</row>").unwrap() < row27);
        assert!(row27 < out.find(r#"<row r="28">"#).unwrap());

        let row29 = out.find(r#"<row r="29"><c r="E29" t="inlineStr">"#).unwrap();
        assert!(row29 < out.find(r#"<row r="30">"#).unwrap());

        let row41 = out.find(r#"<row r="41"><c r="T41" t="inlineStr"><is><t>50%/50%</t></is></c></row></sheetData>"#);
        assert!(row41.is_some());
    }

    #[test]
    fn test_text_is_escaped() {
        let out = set_cells(SHEET, &writes(&[("E26", "a < b & c")])).unwrap();
        assert!(out.contains("<t>a &lt; b &amp; c</t>"));
    }

    #[test]
    fn test_empty_sheet_data() {
        let xml = r#"<worksheet xmlns="urn:x"><sheetData/></worksheet>"#;
        let out = set_cells(xml, &writes(&[("B2", "v")])).unwrap();
        assert_eq!(
            out,
            r#"<worksheet xmlns="urn:x"><sheetData><row r="2"><c r="B2" t="inlineStr"><is><t>v</t></is></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn test_empty_row_element() {
        let xml = r#"<worksheet><sheetData><row r="3"/></sheetData></worksheet>"#;
        let out = set_cells(xml, &writes(&[("A3", "v")])).unwrap();
        assert!(out.contains(r#"<row r="3"><c r="A3" t="inlineStr"><is><t>v</t></is></c></row>"#));
    }

    #[test]
    fn test_prefixed_elements() {
        let xml = r#"<x:worksheet xmlns:x="urn:x"><x:sheetData><x:row r="1"><x:c r="A1"><x:v>1</x:v></x:c></x:row></x:sheetData></x:worksheet>"#;
        let out = set_cells(xml, &writes(&[("A1", "v")])).unwrap();
        assert!(out.contains(r#"<x:c r="A1" t="inlineStr"><x:is><x:t>v</x:t></x:is></x:c>"#));
    }

    #[test]
    fn test_cells_without_reference() {
        let xml = r#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row></sheetData></worksheet>"#;
        let out = set_cells(xml, &writes(&[("B1", "v")])).unwrap();
        assert!(out.contains(r#"<c><v>1</v></c><c r="B1" t="inlineStr">"#));
        assert!(!out.contains("<v>2</v>"));
    }

    #[test]
    fn test_missing_sheet_data() {
        let err = set_cells("<worksheet/>", &[]).unwrap_err();
        assert!(matches!(err, MtcError::Workbook(_)));
    }
}
