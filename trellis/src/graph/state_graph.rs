//! State graph builder: nodes + explicit edges (from → to) and conditional edges.
//!
//! Add nodes with `add_node`, define the chain with `add_edge(from, to)` using
//! `START` and `END` for graph entry/exit. Use `add_conditional_edges` to route
//! to the next node based on state. Then `compile` or
//! `compile_with_checkpointer` to get a [`CompiledGraph`].
//!
//! A node must have either one outgoing `add_edge` or `add_conditional_edges`,
//! not both. Cycles are legal only through conditional edges; every compiled
//! graph carries a step budget that bounds runaway routing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::memory::CheckpointStore;

use super::compile_error::CompileError;
use super::compiled::CompiledGraph;
use super::conditional::{ConditionalRouter, ConditionalRouterFn, NextEntry};
use super::node::Node;
use super::GraphState;

/// Sentinel for graph entry: use as `from_id` in `add_edge(START, first_node_id)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: use as `to_id` in `add_edge(last_node_id, END)`.
pub const END: &str = "__end__";

/// Default step budget when none is set: generous for linear graphs, still
/// finite for accidental cycles.
const DEFAULT_STEP_SLACK: usize = 4;

/// State graph under construction. Generic over state type `S`.
pub struct StateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    /// Edges (from_id, to_id).
    edges: Vec<(String, String)>,
    /// Source node id -> (router, path_map), resolved from state at runtime.
    conditional_edges: HashMap<String, ConditionalRouter<S>>,
    /// Upper bound on node transitions per run; None = nodes + slack.
    step_limit: Option<usize>,
}

impl<S> Default for StateGraph<S>
where
    S: GraphState,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateGraph<S>
where
    S: GraphState,
{
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            conditional_edges: HashMap::new(),
            step_limit: None,
        }
    }

    /// Sets the per-run step budget. A run exceeding it fails with an
    /// internal error instead of looping.
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = Some(limit);
        self
    }

    /// Adds a node; id must be unique. Replaces if same id.
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node<S>>) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    /// Adds an edge from `from_id` to `to_id`.
    ///
    /// Use `START` for graph entry and `END` for graph exit. Both ids (except
    /// START/END) must be registered via `add_node` before `compile()`.
    pub fn add_edge(&mut self, from_id: impl Into<String>, to_id: impl Into<String>) -> &mut Self {
        self.edges.push((from_id.into(), to_id.into()));
        self
    }

    /// Adds conditional edges from `source`: after the source node runs,
    /// `path` is called with the updated state; its return value is the next
    /// node id, or looked up in `path_map` when provided.
    ///
    /// All path_map values (and direct keys when no map) must be valid node
    /// ids or `END`.
    pub fn add_conditional_edges(
        &mut self,
        source: impl Into<String>,
        path: ConditionalRouterFn<S>,
        path_map: Option<HashMap<String, String>>,
    ) -> &mut Self {
        self.conditional_edges
            .insert(source.into(), ConditionalRouter::new(path, path_map));
        self
    }

    /// Builds the executable graph without persistence.
    pub fn compile(self) -> Result<CompiledGraph<S>, CompileError> {
        self.compile_internal(None)
    }

    /// Builds the executable graph with a checkpoint store. Every node exit
    /// persists a checkpoint keyed by the run id; runs with an existing
    /// checkpoint resume after its `last_node`.
    pub fn compile_with_checkpointer(
        self,
        checkpoints: Arc<dyn CheckpointStore<S>>,
    ) -> Result<CompiledGraph<S>, CompileError> {
        self.compile_internal(Some(checkpoints))
    }

    fn compile_internal(
        self,
        checkpoints: Option<Arc<dyn CheckpointStore<S>>>,
    ) -> Result<CompiledGraph<S>, CompileError> {
        for (from, to) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(CompileError::NodeNotFound(from.clone()));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(CompileError::NodeNotFound(to.clone()));
            }
        }
        for (source, router) in &self.conditional_edges {
            if !self.nodes.contains_key(source) {
                return Err(CompileError::NodeNotFound(source.clone()));
            }
            if let Some(ref path_map) = router.path_map {
                for target in path_map.values() {
                    if target != END && !self.nodes.contains_key(target) {
                        return Err(CompileError::InvalidConditionalPathMap(target.clone()));
                    }
                }
            }
        }

        let start_edges: Vec<_> = self
            .edges
            .iter()
            .filter(|(f, _)| f == START)
            .map(|(_, t)| t.clone())
            .collect();
        let first = match start_edges.len() {
            1 => start_edges.into_iter().next().ok_or(CompileError::MissingStart)?,
            _ => return Err(CompileError::MissingStart),
        };

        let has_end = self.edges.iter().any(|(_, t)| t == END)
            || self.conditional_edges.values().any(|r| {
                r.path_map
                    .as_ref()
                    .map_or(true, |m| m.values().any(|v| v == END))
            });
        if !has_end {
            return Err(CompileError::MissingEnd);
        }

        let mut next_map: HashMap<String, NextEntry<S>> = HashMap::new();
        for (from, to) in &self.edges {
            if from == START {
                continue;
            }
            if next_map.contains_key(from) {
                return Err(CompileError::DuplicateEdge(from.clone()));
            }
            next_map.insert(from.clone(), NextEntry::Unconditional(to.clone()));
        }
        for (source, router) in &self.conditional_edges {
            if next_map.contains_key(source) {
                return Err(CompileError::NodeHasBothEdgeAndConditional(source.clone()));
            }
            next_map.insert(source.clone(), NextEntry::Conditional(router.clone()));
        }

        let step_limit = self
            .step_limit
            .unwrap_or(self.nodes.len() + DEFAULT_STEP_SLACK);

        Ok(CompiledGraph {
            nodes: self.nodes,
            first_node_id: first,
            next_map,
            step_limit,
            checkpoints,
        })
    }
}
