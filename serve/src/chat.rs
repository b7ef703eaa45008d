//! POST /chat handler: run the RAG graph, frame events as SSE.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use trellis::rag::ChatRequest;
use trellis::stream::{event_channel, ChatEvent};

use super::app::AppState;

/// Streams one chat run. The SSE body ends when the run emits its terminal
/// frame; a client disconnect drops the stream, which cancels the run (the
/// graph finalizes the current node, checkpoints, and stops).
pub(crate) async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let agent_state = request.into_state();
    debug!(run_id = %agent_state.run_id, user_id = %agent_state.user_id, "chat request");

    let (events, rx) = event_channel(128);
    let cancel = CancellationToken::new();
    let runner = state.runner.clone();
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        runner.run(agent_state, events, run_cancel).await;
    });

    let stream = CancelOnDrop { inner: rx, cancel };
    let stream = futures::StreamExt::map(stream, |event: ChatEvent| {
        Ok::<Event, Infallible>(to_sse_frame(&event))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_frame(event: &ChatEvent) -> Event {
    let data = event
        .payload()
        .map(|p| p.to_string())
        .unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.name()).data(data)
}

/// Signals the run's cancellation token when the SSE body is dropped
/// (client disconnect or natural end; cancelling a finished run is a no-op).
struct CancelOnDrop<S> {
    inner: S,
    cancel: CancellationToken,
}

impl<S> Drop for CancelOnDrop<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<S> Stream for CancelOnDrop<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Frames carry the protocol event name and JSON payload.
    #[test]
    fn frame_has_event_name_and_payload() {
        let frame = to_sse_frame(&ChatEvent::Done {
            run_id: "r1".into(),
        });
        // Event's internals are opaque; render and inspect the wire form.
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("done"));
        assert!(rendered.contains("r1"));
    }

    /// **Scenario**: Dropping the stream cancels the run token.
    #[tokio::test]
    async fn drop_cancels_token() {
        let (_events, rx) = event_channel(4);
        let cancel = CancellationToken::new();
        let stream = CancelOnDrop {
            inner: rx,
            cancel: cancel.clone(),
        };
        assert!(!cancel.is_cancelled());
        drop(stream);
        assert!(cancel.is_cancelled());
    }
}
