pub mod cmap;
pub mod docx;
pub mod lopdf_layout;
pub mod pdftotext;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MtcError;

/// Axis-aligned rectangle in PDF user space (origin bottom-left, y up).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl BBox {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        BBox {
            left,
            bottom,
            right,
            top,
        }
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    /// A box with a NaN or infinite edge has no usable position.
    pub fn is_finite(&self) -> bool {
        [self.left, self.bottom, self.right, self.top]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }
}

/// A text-bearing layout container and its bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub text: String,
    pub bbox: BBox,
}

impl TextBox {
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        TextBox {
            text: text.into(),
            bbox,
        }
    }
}

/// The text boxes of one page, in reading order: top-to-bottom by `top`,
/// then left-to-right by `left`.
///
/// Every "first box that ..." search in the spatial extractor relies on this
/// order, so results do not depend on how a backend emitted the boxes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    boxes: Vec<TextBox>,
}

impl PageLayout {
    pub fn new(mut boxes: Vec<TextBox>) -> Self {
        boxes.retain(|b| !b.text.trim().is_empty() && b.bbox.is_finite());
        boxes.sort_by(|a, b| {
            b.bbox
                .top
                .total_cmp(&a.bbox.top)
                .then(a.bbox.left.total_cmp(&b.bbox.left))
        });
        PageLayout { boxes }
    }

    pub fn boxes(&self) -> &[TextBox] {
        &self.boxes
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// Trait for positioned-text extraction backends.
pub trait LayoutExtractor: Send + Sync {
    /// Extract the text boxes of the first page. A document without pages
    /// yields an empty layout, not an error.
    fn extract_first_page(&self, pdf_bytes: &[u8]) -> Result<PageLayout, MtcError>;

    /// Name of this extraction backend (for diagnostics).
    fn backend_name(&self) -> &str;
}

/// Backend selection for positioned-text extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// pdftotext when installed, lopdf otherwise.
    #[default]
    Auto,
    Lopdf,
    Pdftotext,
}

impl Backend {
    pub fn from_name(name: &str) -> Option<Backend> {
        match name.trim().to_lowercase().as_str() {
            "auto" => Some(Backend::Auto),
            "lopdf" => Some(Backend::Lopdf),
            "pdftotext" | "poppler" => Some(Backend::Pdftotext),
            _ => None,
        }
    }

    pub fn extractor(self) -> Box<dyn LayoutExtractor> {
        match self {
            Backend::Lopdf => Box::new(lopdf_layout::LopdfExtractor::new()),
            Backend::Pdftotext => Box::new(pdftotext::PdftotextExtractor::new()),
            Backend::Auto => {
                if pdftotext::PdftotextExtractor::is_available() {
                    Box::new(pdftotext::PdftotextExtractor::new())
                } else {
                    Box::new(lopdf_layout::LopdfExtractor::new())
                }
            }
        }
    }
}

/// Read a source document, mapping a missing file to `SourceNotFound` and
/// any other I/O failure to `SourceUnreadable`.
pub fn read_source(path: &Path) -> Result<Vec<u8>, MtcError> {
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MtcError::SourceNotFound {
                path: path.to_path_buf(),
            }
        } else {
            MtcError::SourceUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })
}
