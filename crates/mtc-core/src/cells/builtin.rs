use crate::cells::parse_cell_map_str;
use crate::cells::schema::CellMapDef;
use crate::error::MtcError;

const MTC_DEFAULT_JSON: &str = include_str!("../../../../cellmaps/mtc-default.json");

/// Available predefined cell maps.
pub const PRESETS: &[&str] = &["default"];

/// Load a predefined cell map by name.
pub fn load_preset(name: &str) -> Result<CellMapDef, MtcError> {
    match name {
        "default" => parse_cell_map_str(MTC_DEFAULT_JSON),
        _ => Err(MtcError::CellMapInvalid(format!(
            "unknown preset '{}'. Available: {}",
            name,
            PRESETS.join(", ")
        ))),
    }
}

/// The cell layout of the standard certificate template.
pub fn default_cell_map() -> Result<CellMapDef, MtcError> {
    load_preset("default")
}

/// The preset's JSON source, for `mtc cells show`.
pub fn preset_json(name: &str) -> Option<&'static str> {
    match name {
        "default" => Some(MTC_DEFAULT_JSON),
        _ => None,
    }
}
