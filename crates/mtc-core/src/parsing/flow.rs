//! Field search over the ordered token stream of a flow-text report.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::model::{FieldSpec, MicroField, MicrostructureResult, Occurrence, ValueRule};
use crate::trace::{Evidence, Outcome, TraceStepType};

/// Number of tokens after the anchor that may hold the value.
pub const WINDOW_SIZE: usize = 5;

/// The fixed microstructure catalog: one label, occurrence policy and value
/// rule per field.
pub static CATALOG: [FieldSpec; 6] = [
    FieldSpec {
        field: MicroField::GraphiteNodularity,
        occurrence: Occurrence::Last,
        rule: ValueRule::PercentSimple,
    },
    FieldSpec {
        field: MicroField::NodularParticles,
        occurrence: Occurrence::Last,
        rule: ValueRule::NumericTrailingClean,
    },
    FieldSpec {
        field: MicroField::GraphiteSize,
        occurrence: Occurrence::Last,
        rule: ValueRule::NumericTrailingClean,
    },
    FieldSpec {
        field: MicroField::GraphiteForm,
        occurrence: Occurrence::Last,
        rule: ValueRule::Parenthesized,
    },
    FieldSpec {
        field: MicroField::GraphiteFraction,
        occurrence: Occurrence::Last,
        rule: ValueRule::PercentComposite,
    },
    FieldSpec {
        field: MicroField::FerritePearliteRatio,
        occurrence: Occurrence::First,
        rule: ValueRule::RatioPattern,
    },
];

/// Look up the catalog entry for a field.
pub fn spec_for(field: MicroField) -> &'static FieldSpec {
    CATALOG
        .iter()
        .find(|s| s.field == field)
        .unwrap_or(&CATALOG[0])
}

/// Index of the token containing `label` (case-insensitive), honoring the
/// occurrence policy.
pub fn find_anchor(tokens: &[String], label: &str, occurrence: Occurrence) -> Option<usize> {
    let needle = label.to_lowercase();
    let mut matches = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.to_lowercase().contains(&needle))
        .map(|(i, _)| i);

    match occurrence {
        Occurrence::First => matches.next(),
        Occurrence::Last => matches.last(),
    }
}

/// Up to `WINDOW_SIZE` tokens following the anchor.
pub fn neighbor_window(tokens: &[String], anchor: usize) -> &[String] {
    let start = (anchor + 1).min(tokens.len());
    let end = (start + WINDOW_SIZE).min(tokens.len());
    &tokens[start..end]
}

/// Run one catalog entry against the tokens.
pub fn extract_field(tokens: &[String], spec: &FieldSpec) -> (Option<String>, Evidence) {
    let mut evidence = Evidence::new(spec.label());

    let anchor = match find_anchor(tokens, spec.label(), spec.occurrence) {
        Some(i) => i,
        None => {
            evidence.step(TraceStepType::Anchor, "label not present in document");
            return (None, evidence.finish(Outcome::LabelMissing));
        }
    };
    evidence.step(
        TraceStepType::Anchor,
        format!(
            "{} occurrence at token {anchor}: {:?}",
            match spec.occurrence {
                Occurrence::First => "first",
                Occurrence::Last => "last",
            },
            tokens[anchor]
        ),
    );

    let window = neighbor_window(tokens, anchor);
    evidence.step(TraceStepType::Window, format!("{window:?}"));
    if window.is_empty() {
        return (None, evidence.finish(Outcome::ValueMissing));
    }

    match spec.rule.recognize(window) {
        Some(value) => {
            evidence.step(TraceStepType::Rule, format!("{} accepted {value:?}", spec.rule));
            trace!(field = %spec.field, %value, "field resolved");
            (Some(value), evidence.finish(Outcome::Found))
        }
        None => {
            evidence.step(TraceStepType::Rule, format!("{} matched nothing", spec.rule));
            (None, evidence.finish(Outcome::ValueMissing))
        }
    }
}

/// Extract every catalog field from a token stream. Missing labels and
/// values show up as `None`, never as an error.
pub fn extract_fields(tokens: &[String]) -> MicrostructureResult {
    let mut values = BTreeMap::new();
    let mut evidence = Vec::with_capacity(CATALOG.len());

    for spec in &CATALOG {
        let (value, ev) = extract_field(tokens, spec);
        values.insert(spec.field, value);
        evidence.push(ev);
    }

    let result = MicrostructureResult { values, evidence };
    debug!(
        found = result.found_count(),
        total = CATALOG.len(),
        "microstructure fields extracted"
    );
    result
}
