use regex::Regex;
use std::sync::LazyLock;

static NUMBER_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\d.]+").expect("number pattern is valid"));

static HBW_READING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d.]+)\s*HBW").expect("HBW pattern is valid"));

/// Reduce a raw value to its first run of digits and decimal points:
/// "450.2 Mpa" -> "450.2", "12%" -> "12".
///
/// Text without any digit or period is passed through unchanged, so a caller
/// may see non-numeric text here. That is deliberate: the consuming
/// spreadsheet decides what to do with it.
pub fn normalize_numeric(raw: &str) -> String {
    match NUMBER_RUN.find(raw) {
        Some(m) => m.as_str().to_string(),
        None => raw.to_string(),
    }
}

/// The Brinell reading in a text: the digits directly before "HBW"
/// ("Hardness 42.0 HBW" -> "42.0"). A leading index or unrelated number
/// elsewhere in the text is never returned.
pub fn hbw_reading(text: &str) -> Option<&str> {
    HBW_READING
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Strip trailing whitespace, periods and commas: "123.45," -> "123.45".
pub fn strip_trailing_punct(s: &str) -> &str {
    s.trim_end_matches(|c: char| c.is_whitespace() || c == '.' || c == ',')
}

pub fn has_digit(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
}
