use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::trace::Evidence;

/// Microstructure fields read from the flow-text (docx) report.
///
/// Declaration order is catalog order, which is also the `Ord` used for
/// result maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MicroField {
    #[serde(rename = "Graphite Nodularity")]
    GraphiteNodularity,
    #[serde(rename = "Nodular Particles per mm²")]
    NodularParticles,
    #[serde(rename = "Graphite Size")]
    GraphiteSize,
    #[serde(rename = "Graphite Form")]
    GraphiteForm,
    #[serde(rename = "Graphite Fraction")]
    GraphiteFraction,
    #[serde(rename = "Ferrite / Pearlite Ratio")]
    FerritePearliteRatio,
}

impl MicroField {
    pub const ALL: [MicroField; 6] = [
        MicroField::GraphiteNodularity,
        MicroField::NodularParticles,
        MicroField::GraphiteSize,
        MicroField::GraphiteForm,
        MicroField::GraphiteFraction,
        MicroField::FerritePearliteRatio,
    ];

    /// The label text searched for in the report.
    pub fn label(&self) -> &'static str {
        match self {
            MicroField::GraphiteNodularity => "Graphite Nodularity",
            MicroField::NodularParticles => "Nodular Particles per mm²",
            MicroField::GraphiteSize => "Graphite Size",
            MicroField::GraphiteForm => "Graphite Form",
            MicroField::GraphiteFraction => "Graphite Fraction",
            MicroField::FerritePearliteRatio => "Ferrite / Pearlite Ratio",
        }
    }

    pub fn from_label(label: &str) -> Option<MicroField> {
        let wanted = label.trim();
        MicroField::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for MicroField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which occurrence of a repeated label anchors the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occurrence {
    First,
    Last,
}

/// How a value is recognized inside the neighbor window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueRule {
    /// `"12%"`, or `"12"` followed by a lone `"%"` token.
    PercentComposite,
    /// First token with both parentheses, e.g. `"VI (90%)"`.
    Parenthesized,
    /// `"45%/55%"` searched across the first three tokens joined.
    RatioPattern,
    /// First token with `%` that is not a lone `%`.
    PercentSimple,
    /// First digit-bearing token not ending in `%`, trailing punctuation removed.
    NumericTrailingClean,
}

impl fmt::Display for ValueRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueRule::PercentComposite => "percent-composite",
            ValueRule::Parenthesized => "parenthesized",
            ValueRule::RatioPattern => "ratio-regex",
            ValueRule::PercentSimple => "percent-simple",
            ValueRule::NumericTrailingClean => "numeric-trailing-clean",
        };
        f.write_str(name)
    }
}

/// One entry of the static flow-text field catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: MicroField,
    pub occurrence: Occurrence,
    pub rule: ValueRule,
}

impl FieldSpec {
    pub fn label(&self) -> &'static str {
        self.field.label()
    }
}

/// Microstructure values keyed by field. Every catalog field is present;
/// `None` means the field was not found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MicrostructureResult {
    pub values: BTreeMap<MicroField, Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
}

impl MicrostructureResult {
    pub fn get(&self, field: MicroField) -> Option<&str> {
        self.values.get(&field).and_then(|v| v.as_deref())
    }

    pub fn found_count(&self) -> usize {
        self.values.values().filter(|v| v.is_some()).count()
    }
}

/// Tensile triple read from the tensile report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TensileResult {
    pub tensile_strength: Option<String>,
    pub yield_strength: Option<String>,
    pub elongation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
}

/// Hardness readings in top-to-bottom page order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardnessResult {
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
}

/// The consolidated input to the workbook writer.
///
/// A pipeline that failed contributes `None`; its cells are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Certificate {
    pub microstructure: Option<MicrostructureResult>,
    pub tensile: Option<TensileResult>,
    pub hardness: Option<HardnessResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for field in MicroField::ALL {
            assert_eq!(MicroField::from_label(field.label()), Some(field));
        }
        assert_eq!(MicroField::from_label("graphite size"), Some(MicroField::GraphiteSize));
        assert_eq!(MicroField::from_label("Hardness"), None);
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&MicroField::NodularParticles).unwrap();
        assert_eq!(json, "\"Nodular Particles per mm²\"");
    }

    #[test]
    fn test_found_count_ignores_absent() {
        let mut result = MicrostructureResult::default();
        result
            .values
            .insert(MicroField::GraphiteSize, Some("6".into()));
        result.values.insert(MicroField::GraphiteForm, None);
        assert_eq!(result.found_count(), 1);
        assert_eq!(result.get(MicroField::GraphiteSize), Some("6"));
        assert_eq!(result.get(MicroField::GraphiteForm), None);
    }
}
