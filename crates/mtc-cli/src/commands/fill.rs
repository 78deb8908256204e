use mtc_core::error::MtcError;
use mtc_core::model::Certificate;
use mtc_core::workbook::WriteSummary;
use mtc_core::SourcePaths;
use serde::Serialize;
use std::path::PathBuf;

use crate::commands;
use crate::output;

pub struct FillArgs {
    pub micro: Option<PathBuf>,
    pub tensile: Option<PathBuf>,
    pub hardness: Option<PathBuf>,
    pub workbook: PathBuf,
    pub cells: Option<PathBuf>,
}

#[derive(Serialize)]
struct FillReport<'a> {
    certificate: &'a Certificate,
    summary: &'a WriteSummary,
    failed: &'a [PipelineFailure],
}

#[derive(Serialize)]
pub struct PipelineFailure {
    pub pipeline: String,
    pub error: String,
}

pub fn run(
    args: FillArgs,
    backend: &str,
    output_format: &str,
    verbose: bool,
) -> Result<(), MtcError> {
    // A broken cell map should fail before any report is read.
    let map = commands::load_cell_map(args.cells.as_deref())?;
    let extractor = commands::extractor(backend);

    let sources = SourcePaths {
        microstructure: args.micro,
        tensile: args.tensile,
        hardness: args.hardness,
    };
    let results = mtc_core::run_pipelines(&sources, extractor.as_ref());

    let mut certificate = results.certificate();
    if !verbose {
        strip_evidence(&mut certificate);
    }

    let summary = mtc_core::write_certificate(&args.workbook, &certificate, &map)?;

    let failed: Vec<PipelineFailure> = results
        .errors()
        .into_iter()
        .map(|(pipeline, e)| PipelineFailure {
            pipeline: pipeline.to_string(),
            error: e.to_string(),
        })
        .collect();

    match output_format {
        "json" => output::json::print(&FillReport {
            certificate: &certificate,
            summary: &summary,
            failed: &failed,
        })?,
        _ => output::table::print_fill(&summary, &failed, verbose.then_some(&certificate)),
    }

    if failed.is_empty() {
        Ok(())
    } else {
        let names: Vec<&str> = failed.iter().map(|f| f.pipeline.as_str()).collect();
        Err(MtcError::PipelinesFailed(names.join(", ")))
    }
}

pub fn strip_evidence(certificate: &mut Certificate) {
    if let Some(m) = certificate.microstructure.as_mut() {
        m.evidence.clear();
    }
    if let Some(t) = certificate.tensile.as_mut() {
        t.evidence.clear();
    }
    if let Some(h) = certificate.hardness.as_mut() {
        h.evidence.clear();
    }
}
