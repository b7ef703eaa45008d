//! Deterministic embedding models for tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{EmbedCallError, EmbeddingModel};

/// Hash-based deterministic embeddings: the same text always maps to the same
/// vector, and similar character distributions land near each other. Good
/// enough for tests and offline development.
pub struct MockEmbedding {
    dimension: usize,
}

impl MockEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedCallError> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0f32; self.dimension];
                for (i, b) in t.bytes().enumerate() {
                    v[i % self.dimension] += b as f32 / 256.0;
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

/// Scripted model for failure-path tests: fails the first `fail_count` calls
/// with a fixed message, then behaves like [`MockEmbedding`].
pub struct ScriptedEmbedding {
    inner: MockEmbedding,
    fail_count: usize,
    message: String,
    bad_response: bool,
    calls: AtomicUsize,
}

impl ScriptedEmbedding {
    /// Fails the first `n` calls with `Transport(message)`.
    pub fn failing_first(n: usize, message: impl Into<String>, dimension: usize) -> Self {
        Self {
            inner: MockEmbedding::new(dimension),
            fail_count: n,
            message: message.into(),
            bad_response: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with `BadResponse(message)`.
    pub fn bad_response(message: impl Into<String>, dimension: usize) -> Self {
        Self {
            inner: MockEmbedding::new(dimension),
            fail_count: usize::MAX,
            message: message.into(),
            bad_response: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of embed calls observed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingModel for ScriptedEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedCallError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            if self.bad_response {
                return Err(EmbedCallError::BadResponse(self.message.clone()));
            }
            return Err(EmbedCallError::Transport(self.message.clone()));
        }
        self.inner.embed(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        "scripted-embedding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Same text, same vector; vectors have the configured dimension.
    #[tokio::test]
    async fn mock_is_deterministic() {
        let model = MockEmbedding::new(16);
        let a = model.embed(&["hello"]).await.unwrap();
        let b = model.embed(&["hello"]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 16);
    }

    /// **Scenario**: Scripted model fails exactly n times, then recovers.
    #[tokio::test]
    async fn scripted_fails_then_recovers() {
        let model = ScriptedEmbedding::failing_first(2, "timeout", 4);
        assert!(model.embed(&["a"]).await.is_err());
        assert!(model.embed(&["a"]).await.is_err());
        assert!(model.embed(&["a"]).await.is_ok());
        assert_eq!(model.calls(), 3);
    }
}
