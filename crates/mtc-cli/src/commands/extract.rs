use mtc_core::error::MtcError;
use std::path::Path;

use crate::commands;
use crate::output;

pub fn run(
    kind: &str,
    input_file: &Path,
    backend: &str,
    output_format: &str,
    verbose: bool,
) -> Result<(), MtcError> {
    let json = output_format == "json";

    match kind {
        "micro" => {
            let mut result = mtc_core::extract_microstructure(input_file)?;
            if !verbose {
                result.evidence.clear();
            }
            if json {
                output::json::print(&result)?;
            } else {
                output::table::print_microstructure(&result, verbose);
            }
        }
        "tensile" => {
            let extractor = commands::extractor(backend);
            let mut result = mtc_core::extract_tensile(input_file, extractor.as_ref())?;
            if !verbose {
                result.evidence.clear();
            }
            if json {
                output::json::print(&result)?;
            } else {
                output::table::print_tensile(&result, verbose);
            }
        }
        "hardness" => {
            let extractor = commands::extractor(backend);
            let mut result = mtc_core::extract_hardness(input_file, extractor.as_ref())?;
            if !verbose {
                result.evidence.clear();
            }
            if json {
                output::json::print(&result)?;
            } else {
                output::table::print_hardness(&result, verbose);
            }
        }
        other => {
            return Err(MtcError::Extraction(format!(
                "unknown report kind '{other}'. Expected micro, tensile or hardness"
            )))
        }
    }

    Ok(())
}
