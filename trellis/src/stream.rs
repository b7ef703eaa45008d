//! Event streaming from a graph run to the transport layer.
//!
//! Nodes and the runtime emit [`ChatEvent`]s through an [`EventSender`]; the
//! server end drains the channel and frames each event as SSE. A sender with
//! no channel attached is a no-op, so the graph can also run headless (tests,
//! batch evaluation).

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub use stream_event::{ChatEvent, SourceRef, StepPhase};

/// Bounded event channel: the sender side goes into a
/// [`RunContext`](crate::graph::RunContext), the stream side to the
/// transport.
pub fn event_channel(capacity: usize) -> (EventSender, ReceiverStream<ChatEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), ReceiverStream::new(rx))
}

/// Cloneable handle for emitting chat stream events.
///
/// Send failures (receiver dropped, e.g. client went away) are ignored here;
/// disconnect handling is the cancellation token's job.
#[derive(Clone, Default)]
pub struct EventSender {
    tx: Option<mpsc::Sender<ChatEvent>>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<ChatEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sender that drops everything.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub async fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("attached", &self.tx.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Emitted events arrive on the channel in order.
    #[tokio::test]
    async fn emit_delivers_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        sender
            .emit(ChatEvent::AnswerToken { token: "a".into() })
            .await;
        sender
            .emit(ChatEvent::Done {
                run_id: "r1".into(),
            })
            .await;
        assert!(matches!(
            rx.recv().await,
            Some(ChatEvent::AnswerToken { token }) if token == "a"
        ));
        assert!(matches!(rx.recv().await, Some(ChatEvent::Done { .. })));
    }

    /// **Scenario**: A noop sender and a dropped receiver are both silent.
    #[tokio::test]
    async fn emit_tolerates_missing_receiver() {
        EventSender::noop()
            .emit(ChatEvent::AnswerToken { token: "x".into() })
            .await;

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        EventSender::new(tx)
            .emit(ChatEvent::AnswerToken { token: "x".into() })
            .await;
    }
}
