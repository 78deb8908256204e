use mtc_core::error::MtcError;
use std::path::Path;

use crate::commands;
use crate::output;

pub fn run(workbook: &Path, cells: Option<&Path>, output_format: &str) -> Result<(), MtcError> {
    let map = commands::load_cell_map(cells)?;
    let inspected = mtc_core::inspect_certificate(workbook, &map)?;

    match output_format {
        "json" => output::json::print(&inspected)?,
        _ => output::table::print_inspect(workbook, &map.name, &inspected),
    }

    Ok(())
}
