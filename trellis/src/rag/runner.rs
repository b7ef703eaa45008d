//! Request-level runner: validation, injection screening, graph execution,
//! terminal stream events.
//!
//! Per-request errors end with `error` then `done` on the stream; the process
//! never dies for a request. Cancelled runs stop silently after the graph's
//! own `error: cancelled` frame (the client is already gone).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::TrellisError;
use crate::graph::{CompileError, CompiledGraph, RunContext};
use crate::memory::CheckpointStore;
use crate::message::{Message, Role};
use crate::metrics::{incr, Metrics};
use crate::prompt::InjectionFilter;
use crate::state::{AgentState, ChatOptions};
use crate::stream::{ChatEvent, EventSender};

use super::{build_rag_graph, RagDeps};

/// `POST /chat` request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub initial_state: InitialState,
    /// Resumes an existing run when set.
    #[serde(default)]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialState {
    pub user_id: String,
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub options: ChatOptions,
}

/// Incoming message; the timestamp is optional on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatRequest {
    /// Builds the agent state: the provided run id (resume) or a fresh UUID.
    pub fn into_state(self) -> AgentState {
        let run_id = self
            .run_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let messages = self
            .initial_state
            .messages
            .into_iter()
            .map(|m| Message {
                role: m.role,
                content: m.content,
                timestamp: m.timestamp.unwrap_or_else(Utc::now),
            })
            .collect();
        AgentState::new(
            run_id,
            self.initial_state.user_id,
            messages,
            self.initial_state.options,
        )
    }
}

/// Compiled RAG graph plus the request-level policy around it.
pub struct RagRunner {
    graph: CompiledGraph<AgentState>,
    injection: Arc<InjectionFilter>,
    metrics: Arc<Metrics>,
}

impl RagRunner {
    pub fn new(
        deps: &RagDeps,
        checkpoints: Option<Arc<dyn CheckpointStore<AgentState>>>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, CompileError> {
        Ok(Self {
            graph: build_rag_graph(deps, checkpoints)?,
            injection: deps.injection.clone(),
            metrics,
        })
    }

    /// Runs one chat request to completion, emitting every stream event.
    /// Never returns an error: failures become `error` + `done` frames.
    pub async fn run(&self, state: AgentState, events: EventSender, cancel: CancellationToken) {
        incr(&self.metrics.runs_started);
        let run_id = state.run_id.clone();
        let trace_id = state.metadata.trace_id.clone();
        info!(run_id = %run_id, trace_id = %trace_id, user_id = %state.user_id, "chat run started");

        if let Err(e) = state.validate_fresh() {
            self.fail(&events, &run_id, &trace_id, &e).await;
            return;
        }

        // Injection screening happens before any node runs: a flagged message
        // never reaches the LLM.
        if let Err(e) = self.injection.scan_messages(&state.messages) {
            self.fail(&events, &run_id, &trace_id, &e).await;
            return;
        }

        let ctx = RunContext::new(run_id.clone(), trace_id.clone())
            .with_events(events.clone())
            .with_cancel(cancel.clone());

        match self.graph.run(state, &ctx).await {
            Ok(_) if cancel.is_cancelled() => {
                // The graph already emitted error: cancelled and checkpointed.
                incr(&self.metrics.runs_failed);
            }
            Ok(_) => {
                events.emit(ChatEvent::Done { run_id }).await;
                incr(&self.metrics.runs_completed);
            }
            Err(e) => {
                self.fail(&events, &run_id, &trace_id, &e).await;
            }
        }
    }

    async fn fail(&self, events: &EventSender, run_id: &str, trace_id: &str, error: &TrellisError) {
        info!(run_id = %run_id, trace_id = %trace_id, "chat run failed: {}", error);
        events
            .emit(ChatEvent::Error {
                code: error.code().to_string(),
                message: user_message(error, trace_id),
            })
            .await;
        events
            .emit(ChatEvent::Done {
                run_id: run_id.to_string(),
            })
            .await;
        incr(&self.metrics.runs_failed);
    }
}

/// User-visible error text. Internal details stay in the logs; unknown
/// failures reference the trace id.
fn user_message(error: &TrellisError, trace_id: &str) -> String {
    match error {
        TrellisError::Forbidden(_) => {
            "Your message was blocked by the security policy and will not be processed.".to_string()
        }
        TrellisError::Validation(message) => message.clone(),
        _ => format!(
            "We're experiencing technical difficulties. Reference: {}",
            trace_id
        ),
    }
}
