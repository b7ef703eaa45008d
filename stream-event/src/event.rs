//! Chat stream events: wire shape for one SSE frame (event name + payload).
//!
//! The payload field names are the protocol's (camelCase); the event set is a
//! closed union — consumers reject anything outside it at the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Phase marker for a `workflow_step` frame: node entry or exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPhase {
    Enter,
    Exit,
}

/// One cited source in a final answer, in `[n]` citation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// 1-based citation index as it appears in the answer text.
    pub index: usize,
    /// Document id in the vector index.
    pub id: String,
    pub title: String,
}

/// One event on the chat stream.
///
/// `AnswerToken` and `AnswerFinal` share the `answer` SSE event name; the
/// payload shape distinguishes them (incremental `{token}` vs final
/// `{text, sources}`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    WorkflowStep {
        node: String,
        phase: StepPhase,
        #[serde(rename = "elapsedMs", default, skip_serializing_if = "Option::is_none")]
        elapsed_ms: Option<u64>,
    },
    AnswerToken {
        token: String,
    },
    AnswerFinal {
        text: String,
        sources: Vec<SourceRef>,
    },
    Error {
        code: String,
        message: String,
    },
    Done {
        #[serde(rename = "runId")]
        run_id: String,
    },
}

impl ChatEvent {
    /// SSE `event:` field for this frame.
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::WorkflowStep { .. } => "workflow_step",
            ChatEvent::AnswerToken { .. } | ChatEvent::AnswerFinal { .. } => "answer",
            ChatEvent::Error { .. } => "error",
            ChatEvent::Done { .. } => "done",
        }
    }

    /// SSE `data:` payload (the event body without the internal `type` tag).
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(ref mut map) = value {
            map.remove("type");
        }
        Ok(value)
    }
}
