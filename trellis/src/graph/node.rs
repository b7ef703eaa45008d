//! Graph node trait: one step in a [`StateGraph`](super::StateGraph).

use async_trait::async_trait;

use crate::error::TrellisError;

use super::{GraphState, Next, RunContext};

/// One step in a graph: state in, (state out, next step).
///
/// The run loop uses the returned [`Next`] to choose the next node unless the
/// node has conditional edges, in which case the router decides. Nodes that
/// stream output (e.g. answer tokens) do so through `ctx.events`.
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: GraphState,
{
    /// Node id (e.g. `"retrieve"`). Must be unique within a graph.
    fn id(&self) -> &str;

    /// One step: state in, (state out, next step).
    async fn run(&self, state: S, ctx: &RunContext) -> Result<(S, Next), TrellisError>;
}
