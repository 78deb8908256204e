use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MtcError {
    #[error("source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("could not read {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("workbook not found: {path}")]
    DestinationNotFound { path: PathBuf },

    #[error("workbook {path} is locked. Close it in the spreadsheet application and try again")]
    DestinationLocked { path: PathBuf },

    #[error("failed to write workbook {path}: {reason}")]
    WriteFailure { path: PathBuf, reason: String },

    #[error("extraction failed for {0}")]
    PipelinesFailed(String),

    #[error("layout extraction failed: {0}")]
    Extraction(String),

    #[error("malformed workbook package: {0}")]
    Workbook(String),

    #[error("pdftotext not found. Install poppler: brew install poppler (macOS) or apt install poppler-utils (Linux)")]
    PdftotextNotFound,

    #[error("pdftotext failed with exit code {code}: {stderr}")]
    PdftotextFailed { code: i32, stderr: String },

    #[error("failed to load cell map from {path}: {reason}")]
    CellMapLoad { path: PathBuf, reason: String },

    #[error("invalid cell map: {0}")]
    CellMapInvalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MtcError {
    /// Attach a source path to a backend failure.
    ///
    /// Backends only see bytes, so their parse errors come back as
    /// `Extraction` or `Workbook`. Environment problems (missing pdftotext)
    /// pass through.
    pub(crate) fn for_source(self, path: &std::path::Path) -> MtcError {
        match self {
            MtcError::Extraction(reason) | MtcError::Workbook(reason) => {
                MtcError::SourceUnreadable {
                    path: path.to_path_buf(),
                    reason,
                }
            }
            other => other,
        }
    }

    /// Attach the destination path to a package failure during write-back.
    pub(crate) fn for_destination(self, path: &std::path::Path) -> MtcError {
        match self {
            MtcError::Workbook(reason) => MtcError::WriteFailure {
                path: path.to_path_buf(),
                reason,
            },
            MtcError::Io(e) => MtcError::WriteFailure {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
            other => other,
        }
    }
}
