use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::error::MtcError;
use crate::extraction::read_source;

/// The main document body inside a docx package.
pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

/// Read a docx file into its ordered text tokens.
pub fn read_tokens(path: &Path) -> Result<Vec<String>, MtcError> {
    let bytes = read_source(path)?;
    let tokens = tokenize_docx(&bytes).map_err(|e| e.for_source(path))?;
    debug!(path = %path.display(), tokens = tokens.len(), "tokenized docx");
    Ok(tokens)
}

/// Open the docx package and tokenize its main document part.
pub fn tokenize_docx(bytes: &[u8]) -> Result<Vec<String>, MtcError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| MtcError::Extraction(format!("not a docx package: {e}")))?;

    let mut part = archive
        .by_name(MAIN_DOCUMENT_PART)
        .map_err(|e| MtcError::Extraction(format!("missing {MAIN_DOCUMENT_PART}: {e}")))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| MtcError::Extraction(format!("failed to read {MAIN_DOCUMENT_PART}: {e}")))?;

    tokenize_document_xml(&xml)
}

/// Walk the document XML and emit the trimmed text of every `t` element
/// (`w:t`, `a:t`, `m:t`, ...) in document order. Whitespace-only text is
/// dropped. Paragraph, run and table structure is not kept.
pub fn tokenize_document_xml(xml: &str) -> Result<Vec<String>, MtcError> {
    let mut reader = Reader::from_str(xml);
    let mut tokens = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                current = Some(String::new());
            }
            Ok(Event::Text(e)) => {
                if let Some(buf) = current.as_mut() {
                    let text = e.unescape().map_err(|err| {
                        MtcError::Extraction(format!("malformed text in document XML: {err}"))
                    })?;
                    buf.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(buf) = current.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => {
                if let Some(buf) = current.take() {
                    let trimmed = buf.trim();
                    if !trimmed.is_empty() {
                        tokens.push(trimmed.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(MtcError::Extraction(format!(
                    "malformed document XML at position {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    Ok(tokens)
}
