pub mod cells;
pub mod error;
pub mod extraction;
pub mod model;
pub mod parsing;
pub mod trace;
pub mod workbook;

use std::fmt;
use std::path::{Path, PathBuf};
use std::thread::ScopedJoinHandle;

use error::MtcError;
use extraction::{LayoutExtractor, PageLayout};
use model::{Certificate, HardnessResult, MicrostructureResult, TensileResult};
use tracing::{debug, warn};

pub use workbook::inspect::inspect_certificate;
pub use workbook::write_certificate;

/// The three independent extraction pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Microstructure,
    Tensile,
    Hardness,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pipeline::Microstructure => "microstructure",
            Pipeline::Tensile => "tensile",
            Pipeline::Hardness => "hardness",
        })
    }
}

/// Source report for each pipeline. A `None` source skips that pipeline.
#[derive(Debug, Clone, Default)]
pub struct SourcePaths {
    pub microstructure: Option<PathBuf>,
    pub tensile: Option<PathBuf>,
    pub hardness: Option<PathBuf>,
}

/// Per-pipeline outcome of [`run_pipelines`]. `None` means the pipeline had
/// no source; `Some(Err(_))` means it failed without affecting the others.
#[derive(Debug, Default)]
pub struct PipelineResults {
    pub microstructure: Option<Result<MicrostructureResult, MtcError>>,
    pub tensile: Option<Result<TensileResult, MtcError>>,
    pub hardness: Option<Result<HardnessResult, MtcError>>,
}

impl PipelineResults {
    /// Successful results, ready for the writer.
    pub fn certificate(&self) -> Certificate {
        Certificate {
            microstructure: ok_clone(&self.microstructure),
            tensile: ok_clone(&self.tensile),
            hardness: ok_clone(&self.hardness),
        }
    }

    pub fn errors(&self) -> Vec<(Pipeline, &MtcError)> {
        let mut out = Vec::new();
        if let Some(Err(e)) = &self.microstructure {
            out.push((Pipeline::Microstructure, e));
        }
        if let Some(Err(e)) = &self.tensile {
            out.push((Pipeline::Tensile, e));
        }
        if let Some(Err(e)) = &self.hardness {
            out.push((Pipeline::Hardness, e));
        }
        out
    }
}

fn ok_clone<T: Clone>(result: &Option<Result<T, MtcError>>) -> Option<T> {
    result.as_ref().and_then(|r| r.as_ref().ok()).cloned()
}

/// Read the microstructure fields from a flow-text (docx) report.
pub fn extract_microstructure(path: &Path) -> Result<MicrostructureResult, MtcError> {
    let tokens = extraction::docx::read_tokens(path)?;
    Ok(parsing::extract_fields(&tokens))
}

/// Read the first page of a positioned-text (PDF) report.
pub fn read_layout(path: &Path, extractor: &dyn LayoutExtractor) -> Result<PageLayout, MtcError> {
    let bytes = extraction::read_source(path)?;
    let layout = extractor
        .extract_first_page(&bytes)
        .map_err(|e| e.for_source(path))?;
    debug!(
        path = %path.display(),
        backend = extractor.backend_name(),
        boxes = layout.boxes().len(),
        "read page layout"
    );
    Ok(layout)
}

/// Read tensile strength, yield strength and elongation from a tensile report.
pub fn extract_tensile(
    path: &Path,
    extractor: &dyn LayoutExtractor,
) -> Result<TensileResult, MtcError> {
    let layout = read_layout(path, extractor)?;
    Ok(parsing::extract_tensile(&layout))
}

/// Read the hardness readings from a hardness report.
pub fn extract_hardness(
    path: &Path,
    extractor: &dyn LayoutExtractor,
) -> Result<HardnessResult, MtcError> {
    let layout = read_layout(path, extractor)?;
    Ok(parsing::extract_hardness(&layout))
}

fn join<T>(
    pipeline: Pipeline,
    handle: ScopedJoinHandle<'_, Result<T, MtcError>>,
) -> Result<T, MtcError> {
    let result = handle.join().unwrap_or_else(|_| {
        Err(MtcError::Extraction(format!("{pipeline} pipeline panicked")))
    });
    if let Err(e) = &result {
        warn!(%pipeline, error = %e, "pipeline failed");
    }
    result
}

/// Run every pipeline that has a source, each on its own thread.
///
/// The pipelines share nothing; one failing does not stop the others.
pub fn run_pipelines(sources: &SourcePaths, extractor: &dyn LayoutExtractor) -> PipelineResults {
    std::thread::scope(|s| {
        let micro = sources
            .microstructure
            .as_deref()
            .map(|p| s.spawn(move || extract_microstructure(p)));
        let tensile = sources
            .tensile
            .as_deref()
            .map(|p| s.spawn(move || extract_tensile(p, extractor)));
        let hardness = sources
            .hardness
            .as_deref()
            .map(|p| s.spawn(move || extract_hardness(p, extractor)));

        PipelineResults {
            microstructure: micro.map(|h| join(Pipeline::Microstructure, h)),
            tensile: tensile.map(|h| join(Pipeline::Tensile, h)),
            hardness: hardness.map(|h| join(Pipeline::Hardness, h)),
        }
    })
}
