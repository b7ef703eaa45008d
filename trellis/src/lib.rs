//! Trellis: retrieval-augmented chat orchestration.
//!
//! Two halves share this crate. The **embedding pipeline** ([`pipeline`])
//! consumes new-content events from a queue, chunks and embeds the content
//! body ([`chunk`], [`embed`]), and upserts vectors into the index behind
//! [`vector::VectorAdapter`]; failures land in a dead-letter queue that the
//! [`pipeline::DlqReprocessor`] drains with backoff. The **RAG graph**
//! ([`rag`]) serves chat requests: a [`graph::StateGraph`] of six nodes
//! (rewrite → retrieve → widen → tool-route → run-tool → answer) threads an
//! [`state::AgentState`] through checkpointed steps ([`memory`]) and streams
//! [`stream_event::ChatEvent`]s to the caller.
//!
//! External collaborators (vector index, content store, queue, LLM, tools)
//! sit behind traits; in-memory implementations ship for dev and tests.

pub mod chunk;
pub mod embed;
pub mod error;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod prompt;
pub mod rag;
pub mod state;
pub mod stream;
pub mod tools;
pub mod vector;

pub use error::TrellisError;
pub use message::{Message, Role};
pub use metrics::Metrics;
pub use state::AgentState;
