use regex::Regex;
use std::sync::LazyLock;

use crate::model::ValueRule;
use crate::parsing::normalize::{has_digit, strip_trailing_punct};

static RATIO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\.?\d*%\s*/\s*\d+\.?\d*%").expect("ratio pattern is valid")
});

/// Tokens joined when searching for a ratio.
const RATIO_SPAN: usize = 3;

impl ValueRule {
    /// Scan a neighbor window and return the first value this rule accepts.
    pub fn recognize(&self, window: &[String]) -> Option<String> {
        match self {
            ValueRule::PercentComposite => percent_composite(window),
            ValueRule::Parenthesized => window
                .iter()
                .find(|t| t.contains('(') && t.contains(')'))
                .cloned(),
            ValueRule::RatioPattern => {
                let joined: String = window.iter().take(RATIO_SPAN).map(String::as_str).collect();
                RATIO.find(&joined).map(|m| m.as_str().to_string())
            }
            ValueRule::PercentSimple => window
                .iter()
                .find(|t| t.contains('%') && t.chars().count() > 1)
                .cloned(),
            ValueRule::NumericTrailingClean => window
                .iter()
                .find(|t| has_digit(t) && !t.ends_with('%'))
                .map(|t| strip_trailing_punct(t).to_string()),
        }
    }
}

/// `"12%"` in one token, or `"12"` followed by a token that is exactly `"%"`.
/// Checked token by token, so whichever form appears first wins.
fn percent_composite(window: &[String]) -> Option<String> {
    for (i, token) in window.iter().enumerate() {
        if token.contains('%') && has_digit(token) {
            return Some(token.clone());
        }
        if has_digit(token) && window.get(i + 1).is_some_and(|next| next == "%") {
            return Some(format!("{token}%"));
        }
    }
    None
}
