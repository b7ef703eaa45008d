//! Per-run execution context handed to every node.

use tokio_util::sync::CancellationToken;

use crate::stream::EventSender;

/// Run-scoped context: identity, event stream, and cancellation.
///
/// One per request. The cancellation token is tied to the client connection;
/// the run loop checks it between nodes (no mid-node cancellation).
#[derive(Clone, Debug)]
pub struct RunContext {
    /// Stable across resumes; keys the checkpoint.
    pub run_id: String,
    /// Correlates log spans across nodes.
    pub trace_id: String,
    pub events: EventSender,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            trace_id: trace_id.into(),
            events: EventSender::noop(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Builder attaches events and cancel; defaults are inert.
    #[test]
    fn builder_sets_fields() {
        let ctx = RunContext::new("r1", "t1");
        assert_eq!(ctx.run_id, "r1");
        assert!(!ctx.cancel.is_cancelled());

        let token = CancellationToken::new();
        token.cancel();
        let ctx = ctx.with_cancel(token);
        assert!(ctx.cancel.is_cancelled());
    }
}
