//! Compiled state graph: immutable, supports run only.
//!
//! Built by `StateGraph::compile` or `compile_with_checkpointer`. Holds nodes
//! and a next map derived from explicit edges at compile time. Each node exit
//! records elapsed time in the state, emits `workflow_step` events, and (when
//! a checkpoint store is attached) persists a checkpoint keyed by the run id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn, Instrument};

use crate::error::TrellisError;
use crate::memory::{Checkpoint, CheckpointStore};
use crate::stream::{ChatEvent, StepPhase};

use super::conditional::NextEntry;
use super::node::Node;
use super::run_context::RunContext;
use super::state_graph::END;
use super::{GraphState, Next};

/// Compiled graph: immutable structure, supports run only.
#[derive(Clone)]
pub struct CompiledGraph<S> {
    pub(super) nodes: HashMap<String, Arc<dyn Node<S>>>,
    pub(super) first_node_id: String,
    /// Map from node id to how to get next: Unconditional(to_id) or Conditional(router).
    pub(super) next_map: HashMap<String, NextEntry<S>>,
    /// Upper bound on node transitions per run.
    pub(super) step_limit: usize,
    pub(super) checkpoints: Option<Arc<dyn CheckpointStore<S>>>,
}

impl<S> CompiledGraph<S>
where
    S: GraphState,
{
    /// Runs the graph to completion.
    ///
    /// When a checkpoint exists for `ctx.run_id`, its state snapshot replaces
    /// the input state and execution resumes from the node after `last_node`.
    ///
    /// Cancellation is honored between nodes: the current node finishes, a
    /// checkpoint is persisted, an `error: cancelled` event is emitted, and
    /// the partial state is returned as `Ok` (the run stays resumable).
    pub async fn run(&self, state: S, ctx: &RunContext) -> Result<S, TrellisError> {
        if self.nodes.is_empty() || !self.nodes.contains_key(&self.first_node_id) {
            return Err(TrellisError::Internal("empty graph".into()));
        }

        let mut state = state;
        let mut current = self.first_node_id.clone();

        if let Some(store) = &self.checkpoints {
            match store.get(&ctx.run_id).await {
                Ok(Some(cp)) => {
                    info!(run_id = %ctx.run_id, last_node = %cp.last_node, "resuming from checkpoint");
                    match self.successor(&cp.last_node, &cp.state) {
                        Some(next) => {
                            state = cp.state;
                            current = next;
                        }
                        // The run had already reached its last node.
                        None => return Ok(cp.state),
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(run_id = %ctx.run_id, "checkpoint load failed: {}", e),
            }
        }

        let mut steps = 0usize;
        loop {
            steps += 1;
            if steps > self.step_limit {
                return Err(TrellisError::Internal(format!(
                    "step budget exhausted after {} transitions at node {}",
                    self.step_limit, current
                )));
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| TrellisError::Internal(format!("unknown node: {}", current)))?
                .clone();

            ctx.events
                .emit(ChatEvent::WorkflowStep {
                    node: current.clone(),
                    phase: StepPhase::Enter,
                    elapsed_ms: None,
                })
                .await;

            let span = tracing::info_span!("node", trace_id = %ctx.trace_id, node = %current);
            let started = Instant::now();
            let result = node.run(state.clone(), ctx).instrument(span).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let (new_state, next) = match result {
                Ok(output) => output,
                Err(e) => {
                    warn!(trace_id = %ctx.trace_id, node = %current, "node failed: {}", e);
                    return Err(e);
                }
            };
            state = new_state;
            state.record_timing(&current, elapsed_ms);
            debug!(trace_id = %ctx.trace_id, node = %current, elapsed_ms, "node complete");

            ctx.events
                .emit(ChatEvent::WorkflowStep {
                    node: current.clone(),
                    phase: StepPhase::Exit,
                    elapsed_ms: Some(elapsed_ms),
                })
                .await;

            self.save_checkpoint(&ctx.run_id, &state, &current).await;

            if ctx.cancel.is_cancelled() {
                info!(run_id = %ctx.run_id, node = %current, "run cancelled by client");
                ctx.events
                    .emit(ChatEvent::Error {
                        code: "CANCELLED".into(),
                        message: "cancelled".into(),
                    })
                    .await;
                return Ok(state);
            }

            let next_id = match self.next_map.get(&current) {
                Some(NextEntry::Conditional(router)) => {
                    let target = router.resolve_next(&state);
                    debug!(from = %current, to = %target, "conditional routing");
                    Some(target)
                }
                Some(NextEntry::Unconditional(id)) => match next {
                    Next::End => None,
                    Next::Node(id) => Some(id),
                    Next::Continue => Some(id.clone()),
                },
                None => match next {
                    Next::Node(id) => Some(id),
                    _ => None,
                },
            };

            match next_id {
                None => break,
                Some(id) if id == END => break,
                Some(id) => current = id,
            }
        }

        Ok(state)
    }

    /// Resolves the node that follows `last_node` given the restored state,
    /// or `None` when the run had already reached its final node.
    fn successor(&self, last_node: &str, state: &S) -> Option<String> {
        let target = match self.next_map.get(last_node)? {
            NextEntry::Conditional(router) => router.resolve_next(state),
            NextEntry::Unconditional(id) => id.clone(),
        };
        if target == END || !self.nodes.contains_key(&target) {
            None
        } else {
            Some(target)
        }
    }

    /// Checkpoint writes must not fail the run; failures are logged.
    async fn save_checkpoint(&self, run_id: &str, state: &S, last_node: &str) {
        if let Some(store) = &self.checkpoints {
            let checkpoint = Checkpoint::new(run_id, state.clone(), last_node);
            if let Err(e) = store.put(&checkpoint).await {
                warn!(run_id = %run_id, last_node = %last_node, "checkpoint write failed: {}", e);
            }
        }
    }
}
