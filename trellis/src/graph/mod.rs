//! Generic stateful graph runtime: nodes + explicit edges, compile and run.
//!
//! Build a [`StateGraph`] with `add_node` / `add_edge` (using [`START`] and
//! [`END`] for entry/exit) and [`StateGraph::add_conditional_edges`] for
//! state-based routing, then `compile()` or `compile_with_checkpointer()` to
//! obtain a [`CompiledGraph`]. Cycles are legal through conditional edges
//! (the retrieve↔widen loop); a step budget bounds every run.

mod compile_error;
mod compiled;
mod conditional;
mod next;
mod node;
mod run_context;
mod state_graph;

use std::fmt::Debug;

pub use compile_error::CompileError;
pub use compiled::CompiledGraph;
pub use conditional::{ConditionalRouter, ConditionalRouterFn, NextEntry};
pub use next::Next;
pub use node::Node;
pub use run_context::RunContext;
pub use state_graph::{StateGraph, END, START};

/// State threaded through a graph run.
///
/// The runtime needs one hook into the state: recording how long each node
/// took. Everything else is opaque to it.
pub trait GraphState: Clone + Send + Sync + Debug + 'static {
    /// Records elapsed milliseconds for a node; repeated visits accumulate.
    fn record_timing(&mut self, node: &str, elapsed_ms: u64);
}
