//! Append-only ReAct trace: `thought | action | observation` steps with
//! timestamps, tool usage, and confidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReActStepKind {
    Thought,
    Action,
    Observation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReActStep {
    pub kind: ReActStepKind,
    pub timestamp: DateTime<Utc>,
    pub tool: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub confidence: Option<f32>,
}

impl ReActStep {
    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            kind: ReActStepKind::Thought,
            timestamp: Utc::now(),
            tool: None,
            input: Some(text.into()),
            output: None,
            confidence: None,
        }
    }

    pub fn action(tool: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            kind: ReActStepKind::Action,
            timestamp: Utc::now(),
            tool: Some(tool.into()),
            input: Some(input.into()),
            output: None,
            confidence: None,
        }
    }

    pub fn observation(tool: impl Into<String>, output: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            kind: ReActStepKind::Observation,
            timestamp: Utc::now(),
            tool: Some(tool.into()),
            input: None,
            output: Some(output.into()),
            confidence,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReActTrace {
    pub steps: Vec<ReActStep>,
}

impl ReActTrace {
    pub fn push(&mut self, step: ReActStep) {
        self.steps.push(step);
    }

    /// JSON array of steps with ISO-8601 millisecond timestamps.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_appends_in_order() {
        let mut trace = ReActTrace::default();
        trace.push(ReActStep::thought("consider sources"));
        trace.push(ReActStep::action("search", "query terms"));
        trace.push(ReActStep::observation("search", "3 results", Some(0.7)));
        assert_eq!(trace.steps.len(), 3);
        assert_eq!(trace.steps[0].kind, ReActStepKind::Thought);
    }

    #[test]
    fn trace_serialises_to_json() {
        let mut trace = ReActTrace::default();
        trace.push(ReActStep::thought("x"));
        let json = trace.to_json().unwrap();
        assert!(json.contains("thought"));
    }
}
