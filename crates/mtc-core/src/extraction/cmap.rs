//! Minimal ToUnicode CMap reader: `bfchar` and `bfrange` sections only.

use std::collections::HashMap;

/// Character code to Unicode text mapping taken from a font's ToUnicode
/// stream.
#[derive(Debug, Clone, Default)]
pub struct ToUnicode {
    map: HashMap<u32, String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Word(String),
}

impl ToUnicode {
    pub fn parse(data: &[u8]) -> ToUnicode {
        let tokens = tokenize(data);
        let mut cmap = ToUnicode::default();
        let mut i = 0;

        while i < tokens.len() {
            match &tokens[i] {
                Token::Word(w) if w == "beginbfchar" => {
                    i += 1;
                    while i + 1 < tokens.len() {
                        match (&tokens[i], &tokens[i + 1]) {
                            (Token::Hex(src), Token::Hex(dst)) => {
                                cmap.insert(src, utf16_text(dst));
                                i += 2;
                            }
                            _ => break,
                        }
                    }
                }
                Token::Word(w) if w == "beginbfrange" => {
                    i += 1;
                    while i + 2 < tokens.len() {
                        let (start, end) = match (&tokens[i], &tokens[i + 1]) {
                            (Token::Hex(lo), Token::Hex(hi)) => (be_value(lo), be_value(hi)),
                            _ => break,
                        };
                        match &tokens[i + 2] {
                            Token::Hex(dst) => {
                                cmap.insert_range(start, end, dst);
                                i += 3;
                            }
                            Token::ArrayStart => {
                                i += 3;
                                let mut code = Some(start);
                                while i < tokens.len() {
                                    match &tokens[i] {
                                        Token::Hex(dst) => {
                                            if let Some(c) = code.filter(|c| *c <= end) {
                                                cmap.map.insert(c, utf16_text(dst));
                                            }
                                            code = code.and_then(|c| c.checked_add(1));
                                            i += 1;
                                        }
                                        Token::ArrayEnd => {
                                            i += 1;
                                            break;
                                        }
                                        _ => break,
                                    }
                                }
                            }
                            _ => break,
                        }
                    }
                }
                _ => i += 1,
            }
        }

        cmap
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn lookup(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(|s| s.as_str())
    }

    fn insert(&mut self, src: &[u8], text: String) {
        self.map.insert(be_value(src), text);
    }

    fn insert_range(&mut self, start: u32, end: u32, dst: &[u8]) {
        // Consecutive codes map to consecutive values of the last UTF-16 unit.
        let mut units = utf16_units(dst);
        for code in start..=end.min(start.saturating_add(0xFFFF)) {
            self.map.insert(code, String::from_utf16_lossy(&units));
            if let Some(last) = units.last_mut() {
                *last = last.wrapping_add(1);
            }
        }
    }
}

fn be_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|c| match c {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect()
}

fn utf16_text(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let c = data[i];
        match c {
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if data.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let start = i + 1;
                let end = data[start..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map(|p| start + p)
                    .unwrap_or(data.len());
                tokens.push(Token::Hex(decode_hex(&data[start..end])));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'(' => {
                // Literal strings only appear in CMap headers; skip them.
                let mut depth = 0;
                while i < data.len() {
                    match data[i] {
                        b'\\' => i += 1,
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                i += 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ if c.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'>' | b'[' | b']' | b'(' | b'%')
                {
                    i += 1;
                }
                tokens.push(Token::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }

    tokens
}

fn decode_hex(raw: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = raw
        .iter()
        .filter_map(|b| (*b as char).to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => (hi << 4) | lo,
            [hi] => hi << 4,
            _ => 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CMAP: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CMapName /Adobe-Identity-UCS def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0003> <0020>
<0011> <0048>
endbfchar
2 beginbfrange
<0024> <0026> <0061>
<0030> <0031> [<0042> <0057>]
endbfrange
endcmap";

    #[test]
    fn test_bfchar_entries() {
        let cmap = ToUnicode::parse(CMAP);
        assert_eq!(cmap.lookup(0x0003), Some(" "));
        assert_eq!(cmap.lookup(0x0011), Some("H"));
    }

    #[test]
    fn test_bfrange_incrementing() {
        let cmap = ToUnicode::parse(CMAP);
        assert_eq!(cmap.lookup(0x0024), Some("a"));
        assert_eq!(cmap.lookup(0x0026), Some("c"));
        assert_eq!(cmap.lookup(0x0027), None);
    }

    #[test]
    fn test_bfrange_array() {
        let cmap = ToUnicode::parse(CMAP);
        assert_eq!(cmap.lookup(0x0030), Some("B"));
        assert_eq!(cmap.lookup(0x0031), Some("W"));
    }

    #[test]
    fn test_bfrange_array_at_code_space_end() {
        let cmap = ToUnicode::parse(
            b"1 beginbfrange\n<FFFFFFFF> <FFFFFFFF> [<0041> <0042> <0043>]\nendbfrange\n\
              1 beginbfchar\n<01> <0044>\nendbfchar",
        );
        assert_eq!(cmap.lookup(u32::MAX), Some("A"));
        assert_eq!(cmap.lookup(0x01), Some("D"));
    }

    #[test]
    fn test_empty_input() {
        assert!(ToUnicode::parse(b"").is_empty());
    }
}
