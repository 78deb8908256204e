//! Label/neighbor search over the positioned text boxes of a report page.

use tracing::{debug, trace};

use crate::extraction::{PageLayout, TextBox};
use crate::model::{HardnessResult, TensileResult};
use crate::parsing::normalize::{hbw_reading, normalize_numeric};
use crate::trace::{Evidence, Outcome, SpanRole, TraceStepType};

/// Vertical slack when matching a value box to a tensile label.
pub const ALIGN_TOLERANCE: f32 = 2.0;
/// How far left of the label a value box may start.
pub const LEFT_SLACK: f32 = 5.0;
/// Vertical slack for hardness neighbor boxes.
pub const HARDNESS_ALIGN_TOLERANCE: f32 = 5.0;

pub const HARDNESS_LABEL: &str = "Hardness";
pub const HARDNESS_UNIT: &str = "HBW";

/// (label, unit keyword) for the three tensile fields, in triple order.
pub const TENSILE_LABELS: [(&str, &str); 3] = [
    ("Tensile Strength", "Mpa"),
    ("Yield Strength", "Mpa"),
    ("Elongation", "%"),
];

/// A box overlaps the label's vertical band widened by `tolerance`.
fn vertically_aligned(candidate: &TextBox, label: &TextBox, tolerance: f32) -> bool {
    candidate.bbox.bottom < label.bbox.top + tolerance
        && candidate.bbox.top > label.bbox.bottom - tolerance
}

fn gap(candidate: &TextBox, label: &TextBox) -> f32 {
    candidate.bbox.left - label.bbox.right
}

/// Find the value box next to `label`: the first box containing the label
/// (case-sensitive) anchors the search; the nearest box to its right that is
/// on the same row and contains `unit` wins. Boxes that themselves contain
/// the label are never candidates.
///
/// Returns the raw text of the chosen box, untrimmed of units.
pub fn find_value_neighbor<'a>(
    layout: &'a PageLayout,
    label: &str,
    unit: &str,
    evidence: &mut Evidence,
) -> Option<&'a TextBox> {
    let label_box = match layout.boxes().iter().find(|b| b.text.contains(label)) {
        Some(b) => b,
        None => {
            evidence.step(TraceStepType::LabelBox, format!("no box contains {label:?}"));
            return None;
        }
    };
    evidence.step(TraceStepType::LabelBox, format!("{:?}", label_box.text));
    evidence.span(SpanRole::Label, &label_box.text, &label_box.bbox);

    let mut best: Option<(&TextBox, f32)> = None;
    for candidate in layout.boxes() {
        if candidate.text.contains(label)
            || !vertically_aligned(candidate, label_box, ALIGN_TOLERANCE)
            || candidate.bbox.left < label_box.bbox.left - LEFT_SLACK
            || !candidate.text.contains(unit)
        {
            continue;
        }
        let distance = gap(candidate, label_box);
        trace!(label, candidate = %candidate.text, distance, "neighbor candidate");
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }

    match best {
        Some((chosen, distance)) => {
            evidence.step(
                TraceStepType::Candidate,
                format!("{:?} at gap {distance:.1}", chosen.text),
            );
            evidence.span(SpanRole::Value, &chosen.text, &chosen.bbox);
            Some(chosen)
        }
        None => {
            evidence.step(
                TraceStepType::Candidate,
                format!("no aligned box to the right contains {unit:?}"),
            );
            None
        }
    }
}

/// Spatial search followed by numeric normalization, with evidence.
fn extract_labeled_number(
    layout: &PageLayout,
    label: &str,
    unit: &str,
) -> (Option<String>, Evidence) {
    let mut evidence = Evidence::new(label);
    let found = find_value_neighbor(layout, label, unit, &mut evidence);

    let label_found = evidence.spans.iter().any(|s| s.role == SpanRole::Label);

    match found {
        Some(value_box) => {
            let raw = value_box.text.trim();
            let value = normalize_numeric(raw);
            evidence.step(TraceStepType::Normalize, format!("{raw:?} -> {value:?}"));
            (Some(value), evidence.finish(Outcome::Found))
        }
        None if label_found => (None, evidence.finish(Outcome::ValueMissing)),
        None => (None, evidence.finish(Outcome::LabelMissing)),
    }
}

/// Tensile strength, yield strength and elongation from a tensile report
/// page. Each value is independently optional.
pub fn extract_tensile(layout: &PageLayout) -> TensileResult {
    let mut values: [Option<String>; 3] = Default::default();
    let mut evidence = Vec::with_capacity(TENSILE_LABELS.len());

    for (slot, (label, unit)) in values.iter_mut().zip(TENSILE_LABELS) {
        let (value, ev) = extract_labeled_number(layout, label, unit);
        *slot = value;
        evidence.push(ev);
    }

    let [tensile_strength, yield_strength, elongation] = values;
    debug!(
        tensile = ?tensile_strength,
        yield_ = ?yield_strength,
        elongation = ?elongation,
        "tensile values extracted"
    );
    TensileResult {
        tensile_strength,
        yield_strength,
        elongation,
        evidence,
    }
}

/// Hardness readings, one per "Hardness" label box, top of page first.
///
/// A label box that carries its own `<n> HBW` reading is resolved from its
/// own text. Otherwise the nearest row-aligned box strictly to its right
/// with an `<n> HBW` reading supplies the value. Labels resolving to
/// neither are skipped.
pub fn extract_hardness(layout: &PageLayout) -> HardnessResult {
    let mut labels: Vec<&TextBox> = layout
        .boxes()
        .iter()
        .filter(|b| b.text.contains(HARDNESS_LABEL))
        .collect();
    labels.sort_by(|a, b| b.bbox.top.total_cmp(&a.bbox.top));

    let mut values = Vec::new();
    let mut evidence = Vec::with_capacity(labels.len());

    for label in labels {
        let mut ev = Evidence::new(HARDNESS_LABEL);
        ev.step(TraceStepType::LabelBox, format!("{:?}", label.text));
        ev.span(SpanRole::Label, &label.text, &label.bbox);

        if let Some(reading) = hbw_reading(&label.text) {
            ev.step(TraceStepType::SameBox, format!("reading {reading:?} in label box"));
            values.push(reading.to_string());
            evidence.push(ev.finish(Outcome::Found));
            continue;
        }

        let mut best: Option<(&TextBox, &str, f32)> = None;
        for candidate in layout.boxes() {
            if !candidate.text.contains(HARDNESS_UNIT)
                || !vertically_aligned(candidate, label, HARDNESS_ALIGN_TOLERANCE)
                || candidate.bbox.left <= label.bbox.left
            {
                continue;
            }
            let distance = gap(candidate, label);
            // Only boxes with an actual reading compete for the minimum.
            if let Some(reading) = hbw_reading(&candidate.text) {
                if best.map_or(true, |(_, _, d)| distance < d) {
                    best = Some((candidate, reading, distance));
                }
            }
        }

        match best {
            Some((chosen, reading, distance)) => {
                ev.step(
                    TraceStepType::NeighborBox,
                    format!("reading {reading:?} in {:?} at gap {distance:.1}", chosen.text),
                );
                ev.span(SpanRole::Value, &chosen.text, &chosen.bbox);
                values.push(reading.to_string());
                evidence.push(ev.finish(Outcome::Found));
            }
            None => {
                ev.step(TraceStepType::NeighborBox, "no HBW reading beside label");
                evidence.push(ev.finish(Outcome::ValueMissing));
            }
        }
    }

    debug!(values = ?values, "hardness values extracted");
    HardnessResult { values, evidence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::BBox;
    use pretty_assertions::assert_eq;

    fn tb(text: &str, left: f32, bottom: f32, right: f32, top: f32) -> TextBox {
        TextBox::new(text, BBox::new(left, bottom, right, top))
    }

    fn tensile_page() -> Vec<TextBox> {
        vec![
            tb("Tensile Strength", 50.0, 700.0, 150.0, 712.0),
            tb("450.2 Mpa", 300.0, 701.0, 360.0, 711.0),
            tb("510 Mpa", 420.0, 700.0, 470.0, 712.0),
            tb("Yield Strength", 50.0, 680.0, 140.0, 692.0),
            tb("Rp0.2", 300.0, 680.0, 340.0, 692.0),
            tb("Elongation", 50.0, 660.0, 120.0, 672.0),
            tb("12%", 300.0, 660.0, 330.0, 672.0),
            tb("min 10 %", 40.0, 640.0, 90.0, 652.0),
        ]
    }

    #[test]
    fn test_tensile_triple() {
        let result = extract_tensile(&PageLayout::new(tensile_page()));
        assert_eq!(result.tensile_strength.as_deref(), Some("450.2"));
        assert_eq!(result.yield_strength, None);
        assert_eq!(result.elongation.as_deref(), Some("12"));
        assert_eq!(result.evidence.len(), 3);
        assert_eq!(result.evidence[1].outcome, Outcome::ValueMissing);
    }

    #[test]
    fn test_alignment_band() {
        let label = tb("Tensile Strength", 50.0, 700.0, 150.0, 712.0);
        // Touches the band only through the 2-unit tolerance.
        assert!(vertically_aligned(&tb("x", 0.0, 713.0, 1.0, 720.0), &label, 2.0));
        assert!(!vertically_aligned(&tb("x", 0.0, 714.0, 1.0, 720.0), &label, 2.0));
        assert!(!vertically_aligned(&tb("x", 0.0, 690.0, 1.0, 698.0), &label, 2.0));
    }

    #[test]
    fn test_left_slack() {
        let layout = PageLayout::new(vec![
            tb("Elongation", 50.0, 660.0, 120.0, 672.0),
            tb("8 %", 46.0, 660.0, 49.0, 672.0),
            tb("9 %", 30.0, 660.0, 44.0, 672.0),
        ]);
        let mut ev = Evidence::new("Elongation");
        let chosen = find_value_neighbor(&layout, "Elongation", "%", &mut ev).unwrap();
        assert_eq!(chosen.text, "8 %");
    }

    #[test]
    fn test_label_box_not_a_candidate() {
        let layout = PageLayout::new(vec![tb("Tensile Strength 450 Mpa", 50.0, 700.0, 200.0, 712.0)]);
        let result = extract_tensile(&layout);
        assert_eq!(result.tensile_strength, None);
    }

    #[test]
    fn test_non_numeric_passthrough() {
        let layout = PageLayout::new(vec![
            tb("Tensile Strength", 50.0, 700.0, 150.0, 712.0),
            tb("see Mpa table", 300.0, 700.0, 380.0, 712.0),
        ]);
        let result = extract_tensile(&layout);
        assert_eq!(result.tensile_strength.as_deref(), Some("see Mpa table"));
    }

    #[test]
    fn test_empty_page() {
        let result = extract_tensile(&PageLayout::default());
        assert_eq!(result.tensile_strength, None);
        assert_eq!(result.yield_strength, None);
        assert_eq!(result.elongation, None);
        assert!(result
            .evidence
            .iter()
            .all(|e| e.outcome == Outcome::LabelMissing));
        assert!(extract_hardness(&PageLayout::default()).values.is_empty());
    }

    #[test]
    fn test_permutation_independent() {
        let page = tensile_page();
        let expected = extract_tensile(&PageLayout::new(page.clone()));
        let mut reversed = page.clone();
        reversed.reverse();
        let mut rotated = page;
        rotated.rotate_left(3);
        for boxes in [reversed, rotated] {
            let result = extract_tensile(&PageLayout::new(boxes));
            assert_eq!(result.tensile_strength, expected.tensile_strength);
            assert_eq!(result.yield_strength, expected.yield_strength);
            assert_eq!(result.elongation, expected.elongation);
        }
    }

    #[test]
    fn test_hardness_same_box_wins() {
        let layout = PageLayout::new(vec![
            tb("Hardness 42.0 HBW", 50.0, 500.0, 160.0, 512.0),
            tb("39.0 HBW", 161.0, 500.0, 200.0, 512.0),
        ]);
        assert_eq!(extract_hardness(&layout).values, vec!["42.0"]);
    }

    #[test]
    fn test_hardness_neighbor_requires_reading_before_unit() {
        let layout = PageLayout::new(vec![
            tb("Hardness", 50.0, 500.0, 110.0, 512.0),
            tb("HBW 2.5/187.5", 120.0, 500.0, 200.0, 512.0),
            tb("3  205 HBW", 250.0, 502.0, 320.0, 510.0),
        ]);
        let result = extract_hardness(&layout);
        assert_eq!(result.values, vec!["205"]);
    }

    #[test]
    fn test_hardness_top_to_bottom() {
        let layout = PageLayout::new(vec![
            tb("Hardness (core)", 300.0, 300.0, 380.0, 312.0),
            tb("205 HBW", 400.0, 300.0, 450.0, 312.0),
            tb("Hardness (surface)", 50.0, 500.0, 150.0, 512.0),
            tb("210 HBW", 200.0, 500.0, 250.0, 512.0),
            tb("Hardness note", 50.0, 100.0, 120.0, 112.0),
        ]);
        let result = extract_hardness(&layout);
        assert_eq!(result.values, vec!["210", "205"]);
        assert_eq!(result.evidence.len(), 3);
        assert_eq!(result.evidence[2].outcome, Outcome::ValueMissing);
    }

    #[test]
    fn test_hardness_neighbor_strictly_right() {
        let layout = PageLayout::new(vec![
            tb("Hardness", 50.0, 500.0, 110.0, 512.0),
            tb("199 HBW", 50.0, 500.0, 90.0, 512.0),
        ]);
        assert!(extract_hardness(&layout).values.is_empty());
    }
}
