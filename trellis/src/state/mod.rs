//! Agent state threaded through the RAG graph.
//!
//! Nodes follow a state-in, state-out discipline: each returns a new state
//! (copy with deltas) which the runtime checkpoints after every step. The
//! whole record serializes, so a run can resume from its last checkpoint.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TrellisError;
use crate::graph::GraphState;
use crate::message::{Message, Role};

/// One retrieved context document, mapped from a vector index match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDoc {
    pub id: String,
    pub score: f32,
    pub title: String,
    pub body: String,
    /// Creation time of the source content, epoch seconds.
    pub created_at: i64,
    pub source_ref: String,
}

/// Result of one tool execution, successful or not. Always appended; a failed
/// execution carries the fallback output plus `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub input: Value,
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

/// Per-run task bookkeeping: query rewriting, widening loop, tool routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskState {
    pub original_query: String,
    pub rewritten_query: Option<String>,
    pub needs_widening: bool,
    pub widening_attempts: u32,
    pub required_tools: BTreeSet<String>,
    pub tool_to_run: Option<String>,
    pub tool_parameters: Option<Value>,
    pub tool_results: Vec<ToolResult>,
    /// Current retrieval breadth; starts at `options.max_context_items` and
    /// doubles (capped) on each widening pass.
    pub top_k: usize,
}

/// Request options controlling retrieval and generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatOptions {
    pub enhance_with_context: bool,
    pub max_context_items: usize,
    pub include_source_info: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            enhance_with_context: true,
            max_context_items: 10,
            include_source_info: true,
            max_tokens: 4000,
            temperature: 0.7,
        }
    }
}

/// One recorded node-level error (graceful degradation leaves a trace here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeError {
    pub node: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Run-scoped observability: trace id, per-node timings, degraded-path errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub trace_id: String,
    /// Milliseconds spent per node; repeated visits (the retrieve↔widen loop)
    /// accumulate.
    pub node_timings: BTreeMap<String, u64>,
    pub errors: Vec<NodeError>,
}

/// The mutable record threaded through the RAG graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Stable across resumes; keys the checkpoint.
    pub run_id: String,
    pub user_id: String,
    pub messages: Vec<Message>,
    pub tasks: TaskState,
    /// Retrieved context, sorted by score descending after retrieval.
    pub docs: Vec<RetrievedDoc>,
    pub options: ChatOptions,
    pub metadata: RunMetadata,
}

impl AgentState {
    /// Builds a fresh state for a new run. `top_k` starts at
    /// `options.max_context_items`.
    pub fn new(
        run_id: impl Into<String>,
        user_id: impl Into<String>,
        messages: Vec<Message>,
        options: ChatOptions,
    ) -> Self {
        let top_k = options.max_context_items;
        Self {
            run_id: run_id.into(),
            user_id: user_id.into(),
            messages,
            tasks: TaskState {
                top_k,
                ..TaskState::default()
            },
            docs: Vec::new(),
            options,
            metadata: RunMetadata {
                trace_id: uuid::Uuid::new_v4().to_string(),
                ..RunMetadata::default()
            },
        }
    }

    /// Fresh-run invariant: messages non-empty and ending with a user message.
    pub fn validate_fresh(&self) -> Result<(), TrellisError> {
        if self.run_id.is_empty() {
            return Err(TrellisError::Validation("runId must be non-empty".into()));
        }
        let last = self
            .messages
            .last()
            .ok_or_else(|| TrellisError::Validation("messages must be non-empty".into()))?;
        if last.role != Role::User {
            return Err(TrellisError::Validation(
                "a fresh run must end with a user message".into(),
            ));
        }
        Ok(())
    }

    /// The query the graph operates on: the rewrite when present, else the
    /// original.
    pub fn active_query(&self) -> &str {
        self.tasks
            .rewritten_query
            .as_deref()
            .unwrap_or(&self.tasks.original_query)
    }

    /// Records a degraded-path error against a node.
    pub fn record_error(&mut self, node: &str, message: impl Into<String>) {
        self.metadata.errors.push(NodeError {
            node: node.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }
}

impl GraphState for AgentState {
    fn record_timing(&mut self, node: &str, elapsed_ms: u64) {
        *self
            .metadata
            .node_timings
            .entry(node.to_string())
            .or_insert(0) += elapsed_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> AgentState {
        AgentState::new(
            "r1",
            "u1",
            vec![Message::user("What do you know about Delaware?")],
            ChatOptions::default(),
        )
    }

    /// **Scenario**: A fresh state passes validation; top_k follows max_context_items.
    #[test]
    fn fresh_state_valid() {
        let state = fresh();
        assert!(state.validate_fresh().is_ok());
        assert_eq!(state.tasks.top_k, 10);
        assert!(!state.metadata.trace_id.is_empty());
    }

    /// **Scenario**: Empty messages and trailing assistant messages are rejected.
    #[test]
    fn validate_rejects_bad_message_lists() {
        let mut state = fresh();
        state.messages.clear();
        assert!(matches!(
            state.validate_fresh(),
            Err(TrellisError::Validation(_))
        ));

        let mut state = fresh();
        state.messages.push(Message::assistant("hi"));
        assert!(matches!(
            state.validate_fresh(),
            Err(TrellisError::Validation(_))
        ));
    }

    /// **Scenario**: active_query prefers the rewrite.
    #[test]
    fn active_query_prefers_rewrite() {
        let mut state = fresh();
        state.tasks.original_query = "orig".into();
        assert_eq!(state.active_query(), "orig");
        state.tasks.rewritten_query = Some("rewritten".into());
        assert_eq!(state.active_query(), "rewritten");
    }

    /// **Scenario**: Repeated node visits accumulate timings.
    #[test]
    fn timings_accumulate_across_visits() {
        let mut state = fresh();
        state.record_timing("retrieve", 5);
        state.record_timing("retrieve", 7);
        assert_eq!(state.metadata.node_timings.get("retrieve"), Some(&12));
    }

    /// **Scenario**: State round-trips through serde (checkpoint snapshot shape).
    #[test]
    fn state_serde_roundtrip() {
        let mut state = fresh();
        state.record_error("retrieve", "index offline");
        let json = serde_json::to_string(&state).expect("serialize");
        let back: AgentState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.run_id, "r1");
        assert_eq!(back.metadata.errors.len(), 1);
        assert_eq!(back.metadata.errors[0].node, "retrieve");
    }
}
