use serde::{Deserialize, Serialize};

use crate::extraction::BBox;

/// How a value was located. Kept next to each result so a reviewer can see
/// why a cell received the value it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Field or label the entry is about (e.g. "Graphite Size", "Hardness").
    pub field: String,
    pub outcome: Outcome,
    pub steps: Vec<TraceStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<EvidenceSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Found,
    LabelMissing,
    ValueMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStepType {
    Anchor,
    Window,
    Rule,
    LabelBox,
    Candidate,
    SameBox,
    NeighborBox,
    Normalize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub step_type: TraceStepType,
    pub message: String,
}

/// A positioned box that took part in a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    pub role: SpanRole,
    pub text: String,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanRole {
    Label,
    Value,
}

impl Evidence {
    pub fn new(field: impl Into<String>) -> Self {
        Evidence {
            field: field.into(),
            outcome: Outcome::ValueMissing,
            steps: Vec::new(),
            spans: Vec::new(),
        }
    }

    pub fn step(&mut self, step_type: TraceStepType, message: impl Into<String>) {
        self.steps.push(TraceStep {
            step_type,
            message: message.into(),
        });
    }

    pub fn span(&mut self, role: SpanRole, text: &str, bbox: &BBox) {
        self.spans.push(EvidenceSpan {
            role,
            text: text.to_string(),
            left: bbox.left,
            bottom: bbox.bottom,
            right: bbox.right,
            top: bbox.top,
        });
    }

    pub fn finish(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }
}
