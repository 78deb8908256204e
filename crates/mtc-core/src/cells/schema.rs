use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::MicroField;

/// Binding of certificate values to worksheet cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellMapDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Worksheet to write. The workbook's active sheet when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(default)]
    pub tensile: TensileCells,
    /// Hardness cells, filled with readings in page order.
    #[serde(default)]
    pub hardness: Vec<String>,
    /// Microstructure field label -> cell.
    #[serde(default)]
    pub microstructure: BTreeMap<MicroField, String>,
}

/// Cells for the tensile triple. An unset cell means the value is not
/// written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TensileCells {
    #[serde(default)]
    pub tensile_strength: Option<String>,
    #[serde(default)]
    pub yield_strength: Option<String>,
    #[serde(default)]
    pub elongation: Option<String>,
}
