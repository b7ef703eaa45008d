//! Mock chat models for tests and offline runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::Message;

use super::{ChatModel, LlmCallError, TokenChunk};

/// Fixed-reply model.
///
/// By default `invoke_stream` sends the content as a single chunk; enable
/// `with_stream_by_char` to send each character separately (for stream tests).
pub struct MockChat {
    content: String,
    stream_by_char: AtomicBool,
}

impl MockChat {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stream_by_char: AtomicBool::new(false),
        }
    }

    pub fn with_stream_by_char(self) -> Self {
        self.stream_by_char.store(true, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ChatModel for MockChat {
    async fn invoke(&self, _messages: &[Message]) -> Result<String, LlmCallError> {
        Ok(self.content.clone())
    }

    async fn invoke_stream(
        &self,
        messages: Vec<Message>,
        chunk_tx: mpsc::Sender<TokenChunk>,
    ) -> Result<String, LlmCallError> {
        let content = self.invoke(&messages).await?;
        if self.stream_by_char.load(Ordering::SeqCst) {
            for c in content.chars() {
                let _ = chunk_tx
                    .send(TokenChunk {
                        content: c.to_string(),
                    })
                    .await;
            }
        } else if !content.is_empty() {
            let _ = chunk_tx
                .send(TokenChunk {
                    content: content.clone(),
                })
                .await;
        }
        Ok(content)
    }
}

/// Scripted model for failure-path tests.
pub struct ScriptedChat {
    reply: String,
    fail_count: usize,
    message: String,
    /// When true, invoke_stream never produces a byte (gap-timeout testing).
    stall: bool,
    calls: AtomicUsize,
}

impl ScriptedChat {
    /// Fails the first `n` calls with `Transport(message)`, then replies.
    pub fn failing_first(n: usize, message: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail_count: n,
            message: message.into(),
            stall: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Never produces output; pends until cancelled.
    pub fn stalling() -> Self {
        Self {
            reply: String::new(),
            fail_count: 0,
            message: String::new(),
            stall: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn invoke(&self, _messages: &[Message]) -> Result<String, LlmCallError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            std::future::pending::<()>().await;
        }
        if n < self.fail_count {
            return Err(LlmCallError::Transport(self.message.clone()));
        }
        Ok(self.reply.clone())
    }

    async fn invoke_stream(
        &self,
        messages: Vec<Message>,
        chunk_tx: mpsc::Sender<TokenChunk>,
    ) -> Result<String, LlmCallError> {
        let content = self.invoke(&messages).await?;
        if !content.is_empty() {
            let _ = chunk_tx
                .send(TokenChunk {
                    content: content.clone(),
                })
                .await;
        }
        Ok(content)
    }
}
