//! dynamic_widen node: grow retrieval breadth when results come back thin.

use async_trait::async_trait;
use tracing::debug;

use crate::error::TrellisError;
use crate::graph::{Next, Node, RunContext};
use crate::state::AgentState;

use super::{WidenConfig, DYNAMIC_WIDEN};

/// Policy: while fewer than `threshold` docs and attempts remain, double
/// `top_k` (capped), mark the widening pass active, and loop back to
/// retrieve. Exhaustion clears the flag and the run proceeds to answer with
/// whatever was found.
pub struct DynamicWidenNode {
    config: WidenConfig,
}

impl DynamicWidenNode {
    pub fn new(config: WidenConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Node<AgentState> for DynamicWidenNode {
    fn id(&self) -> &str {
        DYNAMIC_WIDEN
    }

    async fn run(
        &self,
        mut state: AgentState,
        _ctx: &RunContext,
    ) -> Result<(AgentState, Next), TrellisError> {
        let thin = state.docs.len() < self.config.threshold;
        if thin && state.tasks.widening_attempts < self.config.max_attempts {
            let widened = (state.tasks.top_k * self.config.growth_factor).min(self.config.top_k_cap);
            state.tasks.top_k = widened;
            state.tasks.needs_widening = true;
            state.tasks.widening_attempts += 1;
            debug!(
                attempt = state.tasks.widening_attempts,
                top_k = widened,
                docs = state.docs.len(),
                "widening retrieval"
            );
        } else {
            state.tasks.needs_widening = false;
        }
        Ok((state, Next::Continue))
    }
}
