pub mod cells;
pub mod extract;
pub mod fill;
pub mod inspect;

use mtc_core::cells::builtin;
use mtc_core::cells::schema::CellMapDef;
use mtc_core::error::MtcError;
use mtc_core::extraction::{Backend, LayoutExtractor};
use std::path::Path;

/// The user's cell map when given, the built-in one otherwise.
pub fn load_cell_map(path: Option<&Path>) -> Result<CellMapDef, MtcError> {
    match path {
        Some(path) => mtc_core::cells::load_cell_map(path),
        None => builtin::default_cell_map(),
    }
}

pub fn extractor(backend: &str) -> Box<dyn LayoutExtractor> {
    Backend::from_name(backend).unwrap_or_default().extractor()
}
