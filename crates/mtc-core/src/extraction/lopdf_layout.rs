//! Pure-Rust positioned-text backend built on lopdf.
//!
//! Walks the first page's content stream with a small text-state machine,
//! measures each shown string with the font's width table, then groups the
//! resulting runs into lines and lines into text boxes.

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId};
use tracing::{debug, trace};

use crate::error::MtcError;
use crate::extraction::cmap::ToUnicode;
use crate::extraction::{BBox, LayoutExtractor, PageLayout, TextBox};

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Glyph width used when a font carries no width table, in 1/1000 em.
const DEFAULT_GLYPH_WIDTH: f32 = 500.0;
const MONOSPACE_GLYPH_WIDTH: f32 = 600.0;

/// Grouping thresholds, all relative to the run height.
#[derive(Debug, Clone, Copy)]
pub struct LayoutParams {
    /// Runs whose vertical overlap exceeds this share of the smaller height
    /// sit on the same line.
    pub line_overlap: f32,
    /// Runs closer than this gap join the same line.
    pub char_margin: f32,
    /// Lines closer than this gap join the same box.
    pub line_margin: f32,
    /// Gaps wider than this inside a line become a space.
    pub word_margin: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        LayoutParams {
            line_overlap: 0.5,
            char_margin: 1.0,
            line_margin: 0.5,
            word_margin: 0.1,
        }
    }
}

/// PDF layout backend using lopdf. No external tools required.
pub struct LopdfExtractor {
    params: LayoutParams,
}

impl LopdfExtractor {
    pub fn new() -> Self {
        LopdfExtractor {
            params: LayoutParams::default(),
        }
    }

    pub fn with_params(params: LayoutParams) -> Self {
        LopdfExtractor { params }
    }
}

impl Default for LopdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutExtractor for LopdfExtractor {
    fn extract_first_page(&self, pdf_bytes: &[u8]) -> Result<PageLayout, MtcError> {
        let doc = Document::load_mem(pdf_bytes)
            .map_err(|e| MtcError::Extraction(format!("failed to parse PDF: {e}")))?;

        let page_id = match doc.get_pages().values().next() {
            Some(id) => *id,
            None => {
                debug!("PDF has no pages");
                return Ok(PageLayout::default());
            }
        };

        let fonts = load_fonts(&doc, page_id);
        let raw = doc
            .get_page_content(page_id)
            .map_err(|e| MtcError::Extraction(format!("failed to read page content: {e}")))?;
        let content = Content::decode(&raw)
            .map_err(|e| MtcError::Extraction(format!("failed to decode page content: {e}")))?;

        let runs = interpret(&content, &fonts);
        let lines = group_runs_into_lines(runs, &self.params);
        let boxes = group_lines_into_boxes(lines, &self.params);
        debug!(boxes = boxes.len(), fonts = fonts.len(), "lopdf layout extracted");

        Ok(PageLayout::new(boxes))
    }

    fn backend_name(&self) -> &str {
        "lopdf"
    }
}

// ---------------------------------------------------------------------------
// Fonts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FontInfo {
    base_font: String,
    /// Type0 fonts use two-byte codes.
    two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: f32,
    /// Descent as a fraction of the font size (negative below baseline).
    descent: f32,
    to_unicode: Option<ToUnicode>,
    /// Per-byte text of a simple font's named base encoding.
    base_encoding: Option<Vec<String>>,
}

impl FontInfo {
    fn fallback() -> Self {
        FontInfo {
            base_font: String::new(),
            two_byte: false,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: DEFAULT_GLYPH_WIDTH,
            descent: 0.0,
            to_unicode: None,
            base_encoding: None,
        }
    }

    fn glyph_width(&self, code: u32) -> f32 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width);
        }
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.default_width)
    }

    /// Split a shown string into (code, text) pairs.
    fn decode(&self, bytes: &[u8]) -> Vec<(u32, String)> {
        let width = if self.two_byte { 2 } else { 1 };
        bytes
            .chunks(width)
            .map(|chunk| {
                let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
                let text = self
                    .to_unicode
                    .as_ref()
                    .and_then(|m| m.lookup(code))
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| {
                        if self.two_byte {
                            char::from_u32(code).map(String::from).unwrap_or_default()
                        } else {
                            self.base_encoding
                                .as_ref()
                                .and_then(|table| table.get(usize::from(chunk[0])))
                                .filter(|text| !text.is_empty())
                                .cloned()
                                .unwrap_or_else(|| win_ansi(chunk[0]).to_string())
                        }
                    });
                (code, text)
            })
            .collect()
    }
}

/// WinAnsi (cp1252) for fonts that name no base encoding. Outside
/// 0x80-0x9F it coincides with Latin-1.
fn win_ansi(b: u8) -> char {
    match b {
        0x80 => '€',
        0x82 => '‚',
        0x83 => 'ƒ',
        0x84 => '„',
        0x85 => '…',
        0x86 => '†',
        0x87 => '‡',
        0x88 => 'ˆ',
        0x89 => '‰',
        0x8A => 'Š',
        0x8B => '‹',
        0x8C => 'Œ',
        0x8E => 'Ž',
        0x91 => '‘',
        0x92 => '’',
        0x93 => '“',
        0x94 => '”',
        0x95 => '•',
        0x96 => '–',
        0x97 => '—',
        0x98 => '˜',
        0x99 => '™',
        0x9A => 'š',
        0x9B => '›',
        0x9C => 'œ',
        0x9E => 'ž',
        0x9F => 'Ÿ',
        _ => char::from(b),
    }
}

/// Decode table for a simple font whose `/Encoding` is a base encoding name
/// (WinAnsi, MacRoman, Standard, ...). Difference dictionaries and unknown
/// names yield `None`.
fn base_encoding_table(doc: &Document, dict: &Dictionary) -> Option<Vec<String>> {
    dict.get(b"Encoding").ok()?.as_name().ok()?;
    match dict.get_font_encoding(doc) {
        Ok(encoding @ Encoding::OneByteEncoding(_)) => Some(
            (0..=u8::MAX)
                .map(|b| encoding.bytes_to_string(&[b]).unwrap_or_default())
                .collect(),
        ),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..8 {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).and_then(|o| o.as_dict().ok())
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Resources of a page, following `Parent` links for inherited entries.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(res) = current.get(b"Resources") {
            return resolve_dict(doc, res);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn load_fonts(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, FontInfo> {
    let mut fonts = HashMap::new();
    let font_dict = match page_resources(doc, page_id)
        .and_then(|res| res.get(b"Font").ok())
        .and_then(|f| resolve_dict(doc, f))
    {
        Some(d) => d,
        None => return fonts,
    };

    for (key, value) in font_dict.iter() {
        if let Some(dict) = resolve_dict(doc, value) {
            let info = load_font(doc, dict);
            trace!(
                font = %String::from_utf8_lossy(key),
                base = %info.base_font,
                two_byte = info.two_byte,
                "loaded font"
            );
            fonts.insert(key.clone(), info);
        }
    }
    fonts
}

fn load_font(doc: &Document, dict: &Dictionary) -> FontInfo {
    let mut info = FontInfo::fallback();

    info.base_font = dict
        .get(b"BaseFont")
        .ok()
        .and_then(|o| o.as_name().ok())
        .map(|n| String::from_utf8_lossy(n).into_owned())
        .unwrap_or_default();
    if info.base_font.to_lowercase().contains("courier") {
        info.default_width = MONOSPACE_GLYPH_WIDTH;
    }

    let subtype = dict
        .get(b"Subtype")
        .ok()
        .and_then(|o| o.as_name().ok())
        .unwrap_or(b"Type1".as_slice());
    info.two_byte = subtype == b"Type0";

    info.to_unicode = dict
        .get(b"ToUnicode")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_stream().ok())
        .map(|stream| {
            let data = match stream.decompressed_content() {
                Ok(d) => d,
                Err(_) => stream.content.clone(),
            };
            ToUnicode::parse(&data)
        })
        .filter(|m| !m.is_empty());

    let descriptor_owner = if info.two_byte {
        let descendant = dict
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|o| resolve_dict(doc, o));
        if let Some(cid_font) = descendant {
            load_cid_widths(doc, cid_font, &mut info);
        }
        descendant
    } else {
        load_simple_widths(doc, dict, &mut info);
        info.base_encoding = base_encoding_table(doc, dict);
        Some(dict)
    };

    if let Some(descent) = descriptor_owner
        .and_then(|d| d.get(b"FontDescriptor").ok())
        .and_then(|o| resolve_dict(doc, o))
        .and_then(|fd| fd.get(b"Descent").ok())
        .and_then(number)
    {
        info.descent = descent / 1000.0;
    }

    info
}

fn load_simple_widths(doc: &Document, dict: &Dictionary, info: &mut FontInfo) {
    info.first_char = dict
        .get(b"FirstChar")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(0)
        .max(0) as u32;
    info.widths = dict
        .get(b"Widths")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
        .map(|arr| {
            arr.iter()
                .map(|w| resolve(doc, w).and_then(number).unwrap_or(0.0))
                .collect()
        })
        .unwrap_or_default();
}

/// CID widths: `DW` default plus the `W` array, whose entries are either
/// `c [w1 w2 ...]` or `c_first c_last w`.
fn load_cid_widths(doc: &Document, cid_font: &Dictionary, info: &mut FontInfo) {
    info.default_width = cid_font
        .get(b"DW")
        .ok()
        .and_then(number)
        .unwrap_or(1000.0);

    let entries = match cid_font
        .get(b"W")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
    {
        Some(arr) => arr,
        None => return,
    };

    let mut i = 0;
    while i + 1 < entries.len() {
        let first = match number(&entries[i]) {
            Some(n) => n as u32,
            None => break,
        };
        match resolve(doc, &entries[i + 1]) {
            Some(Object::Array(ws)) => {
                for (offset, w) in ws.iter().enumerate() {
                    if let Some(w) = number(w) {
                        info.cid_widths.insert(first + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(other) => {
                let last = number(other).map(|n| n as u32).unwrap_or(first);
                if let Some(w) = entries.get(i + 2).and_then(number) {
                    for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                        info.cid_widths.insert(cid, w);
                    }
                }
                i += 3;
            }
            None => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Content stream interpretation
// ---------------------------------------------------------------------------

/// A shown string placed on the page.
#[derive(Debug, Clone)]
struct TextRun {
    text: String,
    bbox: BBox,
}

struct TextState {
    ctm: [f32; 6],
    ctm_stack: Vec<[f32; 6]>,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    font_key: Vec<u8>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horiz_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            ctm: IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            font_key: Vec::new(),
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horiz_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

impl TextState {
    fn translate_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, 0.0], &self.text_matrix);
    }

    fn device_point(&self) -> (f32, f32) {
        let m = multiply(&self.text_matrix, &self.ctm);
        apply(&m, 0.0, self.rise)
    }

    /// Rendered font height, including text-matrix and CTM scaling.
    fn rendered_size(&self) -> f32 {
        let m = multiply(&self.text_matrix, &self.ctm);
        (self.font_size * (m[2] * m[2] + m[3] * m[3]).sqrt()).abs()
    }
}

fn multiply(a: &[f32; 6], b: &[f32; 6]) -> [f32; 6] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn apply(m: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

fn operand_numbers(operands: &[Object]) -> Vec<f32> {
    operands.iter().filter_map(number).collect()
}

fn interpret(content: &Content, fonts: &HashMap<Vec<u8>, FontInfo>) -> Vec<TextRun> {
    let fallback = FontInfo::fallback();
    let mut state = TextState::default();
    let mut runs = Vec::new();

    for op in &content.operations {
        let nums = operand_numbers(&op.operands);
        match op.operator.as_str() {
            "q" => state.ctm_stack.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.ctm_stack.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" if nums.len() == 6 => {
                let m = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                state.ctm = multiply(&m, &state.ctm);
            }
            "BT" => {
                state.text_matrix = IDENTITY;
                state.line_matrix = IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    state.font_key = name.clone();
                }
                if let Some(size) = op.operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "Tm" if nums.len() == 6 => {
                state.text_matrix = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                state.line_matrix = state.text_matrix;
            }
            "Td" if nums.len() == 2 => state.translate_line(nums[0], nums[1]),
            "TD" if nums.len() == 2 => {
                state.leading = -nums[1];
                state.translate_line(nums[0], nums[1]);
            }
            "T*" => state.translate_line(0.0, -state.leading),
            "TL" => {
                if let Some(v) = nums.first() {
                    state.leading = *v;
                }
            }
            "Tc" => {
                if let Some(v) = nums.first() {
                    state.char_spacing = *v;
                }
            }
            "Tw" => {
                if let Some(v) = nums.first() {
                    state.word_spacing = *v;
                }
            }
            "Tz" => {
                if let Some(v) = nums.first() {
                    state.horiz_scale = *v / 100.0;
                }
            }
            "Ts" => {
                if let Some(v) = nums.first() {
                    state.rise = *v;
                }
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    let font = fonts.get(&state.font_key).unwrap_or(&fallback);
                    show_string(bytes, font, &mut state, &mut runs);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    let font = fonts.get(&state.font_key).unwrap_or(&fallback);
                    for item in items {
                        match item {
                            Object::String(bytes, _) => {
                                show_string(bytes, font, &mut state, &mut runs)
                            }
                            other => {
                                if let Some(adjust) = number(other) {
                                    let tx = -adjust / 1000.0 * state.font_size * state.horiz_scale;
                                    state.advance(tx);
                                }
                            }
                        }
                    }
                }
            }
            "'" => {
                state.translate_line(0.0, -state.leading);
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    let font = fonts.get(&state.font_key).unwrap_or(&fallback);
                    show_string(bytes, font, &mut state, &mut runs);
                }
            }
            "\"" => {
                if nums.len() >= 2 {
                    state.word_spacing = nums[0];
                    state.char_spacing = nums[1];
                }
                state.translate_line(0.0, -state.leading);
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    let font = fonts.get(&state.font_key).unwrap_or(&fallback);
                    show_string(bytes, font, &mut state, &mut runs);
                }
            }
            _ => {}
        }
    }

    runs
}

fn show_string(bytes: &[u8], font: &FontInfo, state: &mut TextState, runs: &mut Vec<TextRun>) {
    let size = state.rendered_size();
    let (x0, y0) = state.device_point();
    let mut text = String::new();

    for (code, glyph_text) in font.decode(bytes) {
        let mut tx = font.glyph_width(code) / 1000.0 * state.font_size + state.char_spacing;
        if !font.two_byte && code == 32 {
            tx += state.word_spacing;
        }
        state.advance(tx * state.horiz_scale);
        text.push_str(&glyph_text);
    }

    if text.trim().is_empty() || size <= 0.0 {
        return;
    }

    let (x1, _) = state.device_point();
    let bottom = y0 + font.descent * size;
    runs.push(TextRun {
        text,
        bbox: BBox::new(x0.min(x1), bottom, x0.max(x1), bottom + size),
    });
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TextLine {
    text: String,
    bbox: BBox,
}

fn same_line(line: &TextLine, run: &TextRun, params: &LayoutParams) -> bool {
    let overlap = line.bbox.top.min(run.bbox.top) - line.bbox.bottom.max(run.bbox.bottom);
    let min_height = line.bbox.height().min(run.bbox.height());
    if overlap <= min_height * params.line_overlap {
        return false;
    }
    let height = line.bbox.height().max(run.bbox.height());
    let gap = run.bbox.left - line.bbox.right;
    gap >= -height && gap <= height * params.char_margin
}

/// Join runs into lines in content-stream order, the way text is usually
/// painted: a run continues the current line when it overlaps it vertically
/// and starts close to its right edge.
fn group_runs_into_lines(runs: Vec<TextRun>, params: &LayoutParams) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();

    for run in runs {
        if let Some(line) = lines.last_mut() {
            if same_line(line, &run, params) {
                let gap = run.bbox.left - line.bbox.right;
                let needs_space = gap > line.bbox.height() * params.word_margin
                    && !line.text.ends_with(char::is_whitespace)
                    && !run.text.starts_with(char::is_whitespace);
                if needs_space {
                    line.text.push(' ');
                }
                line.text.push_str(&run.text);
                line.bbox = line.bbox.union(&run.bbox);
                continue;
            }
        }
        lines.push(TextLine {
            text: run.text,
            bbox: run.bbox,
        });
    }

    for line in &mut lines {
        line.text = line.text.trim().to_string();
    }
    lines.retain(|l| !l.text.is_empty());
    lines
}

/// Stack lines into boxes: a line joins a box it overlaps horizontally when
/// the vertical gap is below `line_margin` times the line height.
fn group_lines_into_boxes(mut lines: Vec<TextLine>, params: &LayoutParams) -> Vec<TextBox> {
    lines.sort_by(|a, b| b.bbox.top.total_cmp(&a.bbox.top));

    let mut groups: Vec<(BBox, Vec<String>)> = Vec::new();

    for line in lines {
        let margin = line.bbox.height() * params.line_margin;
        let target = groups.iter_mut().find(|(bbox, _)| {
            let overlaps_x = line.bbox.left < bbox.right && line.bbox.right > bbox.left;
            let close_y =
                line.bbox.top >= bbox.bottom - margin && line.bbox.bottom <= bbox.top + margin;
            overlaps_x && close_y
        });

        match target {
            Some((bbox, texts)) => {
                *bbox = bbox.union(&line.bbox);
                texts.push(line.text);
            }
            None => groups.push((line.bbox, vec![line.text])),
        }
    }

    groups
        .into_iter()
        .map(|(bbox, texts)| TextBox::new(texts.join("\n"), bbox))
        .collect()
}
