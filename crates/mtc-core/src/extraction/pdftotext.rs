use crate::error::MtcError;
use crate::extraction::{BBox, LayoutExtractor, PageLayout, TextBox};
use std::io::Write;
use std::process::Command;
use tracing::debug;

/// PDF layout backend using pdftotext (from poppler-utils).
///
/// Runs `pdftotext -bbox-layout` on the first page. Each `<block>` element
/// becomes one text box, its lines joined with newlines.
pub struct PdftotextExtractor;

impl PdftotextExtractor {
    pub fn new() -> Self {
        PdftotextExtractor
    }

    /// Check if pdftotext is available on the system.
    pub fn is_available() -> bool {
        Command::new("pdftotext")
            .arg("-v")
            .output()
            .map(|o| o.status.success() || !o.stderr.is_empty())
            .unwrap_or(false)
    }
}

impl Default for PdftotextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutExtractor for PdftotextExtractor {
    fn extract_first_page(&self, pdf_bytes: &[u8]) -> Result<PageLayout, MtcError> {
        // pdftotext needs a path, so stage the bytes in a temp file.
        let mut tmpfile =
            tempfile::NamedTempFile::new().map_err(|e| MtcError::Extraction(e.to_string()))?;
        tmpfile
            .write_all(pdf_bytes)
            .map_err(|e| MtcError::Extraction(e.to_string()))?;

        let output = Command::new("pdftotext")
            .args(["-bbox-layout", "-f", "1", "-l", "1"])
            .arg(tmpfile.path())
            .arg("-")
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MtcError::PdftotextNotFound
                } else {
                    MtcError::Extraction(format!("pdftotext failed: {}", e))
                }
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            // poppler reports unparseable input as exit code 1.
            if code == 1 {
                return Err(MtcError::Extraction(format!(
                    "pdftotext could not read the document: {}",
                    stderr.trim()
                )));
            }
            return Err(MtcError::PdftotextFailed { code, stderr });
        }

        let xml = String::from_utf8_lossy(&output.stdout);
        let boxes = parse_bbox_layout(&xml);
        debug!(boxes = boxes.len(), "pdftotext layout extracted");
        Ok(PageLayout::new(boxes))
    }

    fn backend_name(&self) -> &str {
        "pdftotext"
    }
}

/// Parse the first `<page>` of pdftotext's `-bbox-layout` XHTML into text
/// boxes, flipping y into the bottom-left origin frame.
fn parse_bbox_layout(xml: &str) -> Vec<TextBox> {
    let mut out = Vec::new();
    let mut page_height: Option<f32> = None;
    let mut block_bbox: Option<BBox> = None;
    let mut block_lines: Vec<String> = Vec::new();
    let mut line_words: Vec<String> = Vec::new();

    for raw in xml.lines() {
        let line = raw.trim();

        if line.starts_with("<page ") {
            if page_height.is_some() {
                break;
            }
            page_height = parse_attr_f32(line, "height");
            continue;
        }

        if line.starts_with("</page>") {
            break;
        }

        if line.starts_with("<block ") {
            block_bbox = page_height.and_then(|h| parse_flipped_bbox(line, h));
            block_lines.clear();
            continue;
        }

        if line.starts_with("<line ") {
            line_words.clear();
            continue;
        }

        if line.starts_with("<word ") {
            if let Some(word_text) = parse_word_text(line) {
                let w = decode_xml_entities(&word_text).trim().to_string();
                if !w.is_empty() {
                    line_words.push(w);
                }
            }
            continue;
        }

        if line.starts_with("</line>") {
            if !line_words.is_empty() {
                block_lines.push(line_words.join(" "));
            }
            line_words.clear();
            continue;
        }

        if line.starts_with("</block>") {
            if let Some(bbox) = block_bbox.take() {
                if !block_lines.is_empty() {
                    out.push(TextBox::new(block_lines.join("\n"), bbox));
                }
            }
            block_lines.clear();
        }
    }

    out
}

fn parse_attr_f32(tag: &str, name: &str) -> Option<f32> {
    parse_attr(tag, name)?.parse().ok()
}

fn parse_attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {}=\"", name);
    let start = tag.find(&needle)? + needle.len();
    let rest = &tag[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

/// pdftotext measures y from the top of the page.
fn parse_flipped_bbox(tag: &str, page_height: f32) -> Option<BBox> {
    let x_min = parse_attr_f32(tag, "xMin")?;
    let y_min = parse_attr_f32(tag, "yMin")?;
    let x_max = parse_attr_f32(tag, "xMax")?;
    let y_max = parse_attr_f32(tag, "yMax")?;
    Some(BBox::new(
        x_min,
        page_height - y_max,
        x_max,
        page_height - y_min,
    ))
}

fn parse_word_text(word_tag: &str) -> Option<String> {
    let start = word_tag.find('>')? + 1;
    let end = word_tag.rfind("</word>")?;
    Some(word_tag[start..end].to_string())
}

fn decode_xml_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<body>
<doc>
  <page width="595.000000" height="842.000000">
    <flow>
      <block xMin="72.000000" yMin="100.000000" xMax="160.000000" yMax="124.000000">
        <line xMin="72.000000" yMin="100.000000" xMax="160.000000" yMax="110.000000">
          <word xMin="72.000000" yMin="100.000000" xMax="110.000000" yMax="110.000000">Hardness</word>
          <word xMin="112.000000" yMin="100.000000" xMax="160.000000" yMax="110.000000">(surface)</word>
        </line>
        <line xMin="72.000000" yMin="114.000000" xMax="140.000000" yMax="124.000000">
          <word xMin="72.000000" yMin="114.000000" xMax="100.000000" yMax="124.000000">210</word>
          <word xMin="104.000000" yMin="114.000000" xMax="140.000000" yMax="124.000000">HBW</word>
        </line>
      </block>
      <block xMin="300.000000" yMin="100.000000" xMax="340.000000" yMax="110.000000">
        <line xMin="300.000000" yMin="100.000000" xMax="340.000000" yMax="110.000000">
          <word xMin="300.000000" yMin="100.000000" xMax="340.000000" yMax="110.000000">R&amp;D</word>
        </line>
      </block>
    </flow>
  </page>
  <page width="595.000000" height="842.000000">
    <flow>
      <block xMin="1.000000" yMin="1.000000" xMax="2.000000" yMax="2.000000">
        <line xMin="1.000000" yMin="1.000000" xMax="2.000000" yMax="2.000000">
          <word xMin="1.000000" yMin="1.000000" xMax="2.000000" yMax="2.000000">second</word>
        </line>
      </block>
    </flow>
  </page>
</doc>
</body>
</html>
"#;

    #[test]
    fn test_blocks_become_boxes() {
        let boxes = parse_bbox_layout(LAYOUT);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].text, "Hardness (surface)\n210 HBW");
        assert_eq!(boxes[1].text, "R&D");
    }

    #[test]
    fn test_y_axis_flipped() {
        let boxes = parse_bbox_layout(LAYOUT);
        assert_eq!(boxes[0].bbox, BBox::new(72.0, 718.0, 160.0, 742.0));
    }

    #[test]
    fn test_only_first_page() {
        let boxes = parse_bbox_layout(LAYOUT);
        assert!(boxes.iter().all(|b| b.text != "second"));
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_bbox_layout("<doc></doc>").is_empty());
    }
}
