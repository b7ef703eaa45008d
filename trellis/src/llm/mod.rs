//! LLM adapter: one policy layer over the chat model binding.
//!
//! [`ChatModel`] is the raw binding (OpenAI in production, mocks in tests).
//! [`LlmAdapter`] owns the timeout/retry/fallback policy shared by every
//! caller: 60 s sync timeout with one retry on transport or timeout errors;
//! 120 s streaming wall clock with a 30 s inter-token gap and no retry after
//! the first byte. Tokens pass straight through — the adapter never buffers a
//! whole response before forwarding.

mod mock;
mod openai;

pub use mock::{MockChat, ScriptedChat};
pub use openai::ChatOpenAi;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::warn;

use crate::error::TrellisError;
use crate::message::Message;

/// One chunk of streamed completion content.
#[derive(Debug, Clone)]
pub struct TokenChunk {
    pub content: String,
}

/// Error from one model call.
#[derive(Debug, thiserror::Error)]
pub enum LlmCallError {
    /// Network-level failure; retried by the adapter.
    #[error("transport: {0}")]
    Transport(String),
    /// The response shape was unusable; never retried.
    #[error("bad response: {0}")]
    BadResponse(String),
}

/// Chat model binding: given messages, produce assistant text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Non-streaming completion.
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmCallError>;

    /// Streaming completion: send chunks through `chunk_tx` as they arrive,
    /// then return the full text. Implementations that cannot stream may send
    /// the whole text as one chunk.
    async fn invoke_stream(
        &self,
        messages: Vec<Message>,
        chunk_tx: mpsc::Sender<TokenChunk>,
    ) -> Result<String, LlmCallError>;
}

#[derive(Debug, Clone)]
pub struct LlmAdapterConfig {
    pub sync_timeout: Duration,
    /// Wall-clock limit for a whole streaming call.
    pub stream_timeout: Duration,
    /// Maximum gap between consecutive tokens.
    pub token_gap: Duration,
    /// Retries after the first attempt (sync, and streaming before the first byte).
    pub retry_attempts: u32,
    /// Fixed apology returned by the fallback paths.
    pub fallback_message: String,
}

impl Default for LlmAdapterConfig {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(60),
            stream_timeout: Duration::from_secs(120),
            token_gap: Duration::from_secs(30),
            retry_attempts: 1,
            fallback_message:
                "I'm sorry, I'm having trouble generating a response right now. Please try again \
                 in a moment."
                    .to_string(),
        }
    }
}

/// Canned reply used when no model binding exists in a test context.
const TEST_MODE_REPLY: &str = "This is a canned response from test mode.";

/// Unified sync + streaming LLM access with one retry/timeout/fallback policy.
#[derive(Clone)]
pub struct LlmAdapter {
    model: Option<Arc<dyn ChatModel>>,
    config: LlmAdapterConfig,
}

impl LlmAdapter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model: Some(model),
            config: LlmAdapterConfig::default(),
        }
    }

    pub fn with_config(model: Arc<dyn ChatModel>, config: LlmAdapterConfig) -> Self {
        Self {
            model: Some(model),
            config,
        }
    }

    /// Adapter without a model binding: canned replies in test contexts,
    /// exhausted errors otherwise.
    pub fn absent() -> Self {
        Self {
            model: None,
            config: LlmAdapterConfig::default(),
        }
    }

    /// The fixed apology for exhausted-adapter fallbacks.
    pub fn fallback_message(&self) -> &str {
        &self.config.fallback_message
    }

    /// Non-streaming call: `sync_timeout` per attempt, one retry on transport
    /// or timeout errors. Exhaustion surfaces as an error; callers that want
    /// the apology use [`LlmAdapter::fallback_message`].
    pub async fn call(&self, messages: &[Message]) -> Result<String, TrellisError> {
        let Some(model) = &self.model else {
            return self.absent_reply(None).await;
        };

        let max_attempts = 1 + self.config.retry_attempts;
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            match timeout(self.config.sync_timeout, model.invoke(messages)).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(LlmCallError::BadResponse(e))) => {
                    return Err(TrellisError::Internal(format!("llm bad response: {}", e)));
                }
                Ok(Err(LlmCallError::Transport(e))) => {
                    warn!(attempt, "llm call transport error: {}", e);
                    last_error = Some(TrellisError::Transport(e));
                }
                Err(_) => {
                    warn!(attempt, "llm call timed out");
                    last_error = Some(TrellisError::Timeout(format!(
                        "llm call exceeded {:?}",
                        self.config.sync_timeout
                    )));
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| TrellisError::Internal("llm retries exhausted".into())))
    }

    /// Streaming call: chunks pass through `chunk_tx` as they arrive; returns
    /// the full text at the end.
    ///
    /// Before the first byte, transport/timeout errors get one retry. After
    /// the first byte there are no retries: a stalled or broken stream is
    /// aborted and whatever was streamed is returned as the final text, so
    /// the writer can close cleanly.
    pub async fn call_stream(
        &self,
        messages: &[Message],
        chunk_tx: mpsc::Sender<TokenChunk>,
    ) -> Result<String, TrellisError> {
        let Some(model) = &self.model else {
            return self.absent_reply(Some(&chunk_tx)).await;
        };

        let max_attempts = 1 + self.config.retry_attempts;
        let mut attempt = 0u32;
        'attempts: loop {
            attempt += 1;
            let (inner_tx, mut inner_rx) = mpsc::channel::<TokenChunk>(128);
            let model = model.clone();
            let owned_messages = messages.to_vec();
            let mut task =
                tokio::spawn(async move { model.invoke_stream(owned_messages, inner_tx).await });
            let deadline = Instant::now() + self.config.stream_timeout;
            let mut streamed = String::new();
            let mut first_byte = false;

            loop {
                let now = Instant::now();
                if now >= deadline {
                    task.abort();
                    if first_byte {
                        warn!("stream wall clock exceeded; returning partial text");
                        return Ok(streamed);
                    }
                    if attempt < max_attempts {
                        continue 'attempts;
                    }
                    return Err(TrellisError::Timeout(format!(
                        "stream exceeded {:?}",
                        self.config.stream_timeout
                    )));
                }
                let window = self.config.token_gap.min(deadline - now);

                match timeout(window, inner_rx.recv()).await {
                    Ok(Some(chunk)) => {
                        first_byte = true;
                        streamed.push_str(&chunk.content);
                        let _ = chunk_tx.send(chunk).await;
                    }
                    Ok(None) => {
                        // Model closed its sender; collect the final result.
                        return match (&mut task).await {
                            Ok(Ok(full)) => {
                                if !first_byte && !full.is_empty() {
                                    let _ = chunk_tx
                                        .send(TokenChunk {
                                            content: full.clone(),
                                        })
                                        .await;
                                }
                                Ok(if streamed.is_empty() { full } else { streamed })
                            }
                            Ok(Err(LlmCallError::Transport(e))) => {
                                if !first_byte && attempt < max_attempts {
                                    warn!(attempt, "stream transport error, retrying: {}", e);
                                    continue 'attempts;
                                }
                                if first_byte {
                                    warn!("stream broke mid-response: {}", e);
                                    return Ok(streamed);
                                }
                                Err(TrellisError::Transport(e))
                            }
                            Ok(Err(LlmCallError::BadResponse(e))) => {
                                Err(TrellisError::Internal(format!("llm bad response: {}", e)))
                            }
                            Err(e) => {
                                Err(TrellisError::Internal(format!("stream task failed: {}", e)))
                            }
                        };
                    }
                    Err(_) => {
                        // Inter-token gap exceeded.
                        task.abort();
                        if first_byte {
                            warn!(
                                gap_secs = self.config.token_gap.as_secs(),
                                "token gap exceeded; returning partial text"
                            );
                            return Ok(streamed);
                        }
                        if attempt < max_attempts {
                            warn!(attempt, "no first token within gap, retrying");
                            continue 'attempts;
                        }
                        return Err(TrellisError::Timeout(
                            "no tokens within the inter-token gap".into(),
                        ));
                    }
                }
            }
        }
    }

    /// No-binding path: canned reply in a test context, exhausted error
    /// otherwise.
    async fn absent_reply(
        &self,
        chunk_tx: Option<&mpsc::Sender<TokenChunk>>,
    ) -> Result<String, TrellisError> {
        if cfg!(test) || std::env::var("TRELLIS_TEST_MODE").is_ok() {
            if let Some(tx) = chunk_tx {
                let _ = tx
                    .send(TokenChunk {
                        content: TEST_MODE_REPLY.to_string(),
                    })
                    .await;
            }
            return Ok(TEST_MODE_REPLY.to_string());
        }
        Err(TrellisError::Internal("no chat model binding configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs() -> Vec<Message> {
        vec![Message::user("hello")]
    }

    fn fast_config() -> LlmAdapterConfig {
        LlmAdapterConfig {
            sync_timeout: Duration::from_millis(200),
            stream_timeout: Duration::from_millis(500),
            token_gap: Duration::from_millis(200),
            retry_attempts: 1,
            fallback_message: "apology".into(),
        }
    }

    /// **Scenario**: Sync call passes text through.
    #[tokio::test]
    async fn call_returns_model_text() {
        let adapter = LlmAdapter::new(Arc::new(MockChat::new("42")));
        assert_eq!(adapter.call(&msgs()).await.unwrap(), "42");
    }

    /// **Scenario**: One transport failure is retried; the second attempt wins.
    #[tokio::test]
    async fn call_retries_transport_once() {
        let model = Arc::new(ScriptedChat::failing_first(1, "connection reset", "ok"));
        let adapter = LlmAdapter::with_config(model.clone(), fast_config());
        assert_eq!(adapter.call(&msgs()).await.unwrap(), "ok");
        assert_eq!(model.calls(), 2);
    }

    /// **Scenario**: Persistent transport failure exhausts the retry and errors.
    #[tokio::test]
    async fn call_exhausts_and_errors() {
        let model = Arc::new(ScriptedChat::failing_first(99, "connection reset", "ok"));
        let adapter = LlmAdapter::with_config(model.clone(), fast_config());
        let err = adapter.call(&msgs()).await.unwrap_err();
        assert!(matches!(err, TrellisError::Transport(_)));
        assert_eq!(model.calls(), 2, "one attempt plus one retry");
    }

    /// **Scenario**: Streaming forwards every chunk and returns the full text.
    #[tokio::test]
    async fn stream_passes_chunks_through() {
        let adapter = LlmAdapter::new(Arc::new(MockChat::new("hi!").with_stream_by_char()));
        let (tx, mut rx) = mpsc::channel(16);
        let full = adapter.call_stream(&msgs(), tx).await.unwrap();
        assert_eq!(full, "hi!");

        let mut tokens = Vec::new();
        while let Some(chunk) = rx.recv().await {
            tokens.push(chunk.content);
        }
        assert_eq!(tokens, vec!["h", "i", "!"]);
    }

    /// **Scenario**: A model that never produces a first byte times out after
    /// the retry budget.
    #[tokio::test]
    async fn stream_times_out_without_first_byte() {
        let model = Arc::new(ScriptedChat::stalling());
        let adapter = LlmAdapter::with_config(model, fast_config());
        let (tx, _rx) = mpsc::channel(16);
        let err = adapter.call_stream(&msgs(), tx).await.unwrap_err();
        assert!(matches!(err, TrellisError::Timeout(_)));
    }

    /// **Scenario**: Without a binding, a test context yields the canned reply
    /// as one chunk.
    #[tokio::test]
    async fn absent_binding_canned_in_tests() {
        let adapter = LlmAdapter::absent();
        let (tx, mut rx) = mpsc::channel(4);
        let text = adapter.call_stream(&msgs(), tx).await.unwrap();
        assert_eq!(text, TEST_MODE_REPLY);
        assert_eq!(rx.recv().await.unwrap().content, TEST_MODE_REPLY);
        assert!(rx.recv().await.is_none());
    }
}
