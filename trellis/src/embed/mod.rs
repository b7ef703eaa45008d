//! Batched embedding generation with retry.
//!
//! [`EmbeddingModel`] is the binding to the actual model (OpenAI in
//! production, deterministic mocks in tests). [`Embedder`] wraps a model with
//! the batching/retry policy: contiguous batches, a pause between them to
//! bound concurrent memory, and linear backoff per batch.

mod mock;
mod openai;

pub use mock::{MockEmbedding, ScriptedEmbedding};
pub use openai::OpenAiEmbedding;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Error from one embedding model call.
#[derive(Debug, thiserror::Error)]
pub enum EmbedCallError {
    /// Network-level failure; retried by the [`Embedder`].
    #[error("transport: {0}")]
    Transport(String),
    /// The response had no recognizable vector array; never retried.
    #[error("unrecognized response shape: {0}")]
    BadResponse(String),
}

/// Embedding failure after the retry policy is exhausted (or on a
/// non-retryable response). Carried into the DLQ entry for the job.
#[derive(Debug, thiserror::Error)]
#[error("embedding failed: model={model} batch_size={batch_size} attempts={attempts}: {cause}")]
pub struct EmbeddingError {
    pub model: String,
    pub batch_size: usize,
    pub attempts: u32,
    pub cause: String,
}

/// Produces fixed-size float vectors from text.
///
/// Implementations must preserve input order and length.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embeds each text into a vector of dimension [`EmbeddingModel::dimension`].
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedCallError>;

    /// Vector dimension returned by [`EmbeddingModel::embed`].
    fn dimension(&self) -> usize;

    /// Model identifier, used in error reports.
    fn model_name(&self) -> &str;
}

/// Batching/retry configuration for the [`Embedder`].
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub max_batch_size: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Pause between consecutive batches to bound concurrent memory.
    pub batch_pause: Duration,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            batch_pause: Duration::from_millis(50),
        }
    }
}

/// Batched embedding calls with retry and timeout discipline.
///
/// Order- and length-preserving: `embed(texts)[i]` is the vector for
/// `texts[i]`.
#[derive(Clone)]
pub struct Embedder {
    model: Arc<dyn EmbeddingModel>,
    config: EmbedderConfig,
}

impl Embedder {
    pub fn new(model: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            model,
            config: EmbedderConfig::default(),
        }
    }

    pub fn with_config(model: Arc<dyn EmbeddingModel>, config: EmbedderConfig) -> Self {
        Self { model, config }
    }

    /// Vector dimension of the underlying model.
    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    /// Embeds all texts, partitioning into contiguous batches of at most
    /// `max_batch_size`. Batches run sequentially with a pause between them.
    /// Empty input returns empty output.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(texts.len());
        let batches: Vec<&[String]> = texts.chunks(self.config.max_batch_size).collect();
        let last = batches.len() - 1;
        for (i, batch) in batches.into_iter().enumerate() {
            let vectors = self.embed_batch(batch).await?;
            out.extend(vectors);
            if i < last {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }
        Ok(out)
    }

    /// Embeds a single text. Convenience for query embedding.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed(&texts).await?;
        vectors.pop().ok_or_else(|| EmbeddingError {
            model: self.model.model_name().to_string(),
            batch_size: 1,
            attempts: 1,
            cause: "model returned no vector".into(),
        })
    }

    /// One batch with up to `retry_attempts` tries and linear backoff
    /// (`retry_delay × attempt`). A bad response shape fails immediately.
    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.model.embed(&refs).await {
                Ok(vectors) => {
                    if vectors.len() != batch.len() {
                        return Err(self.error(batch.len(), attempt, format!(
                            "model returned {} vectors for {} inputs",
                            vectors.len(),
                            batch.len()
                        )));
                    }
                    debug!(batch_size = batch.len(), attempt, "embedded batch");
                    return Ok(vectors);
                }
                Err(EmbedCallError::BadResponse(cause)) => {
                    return Err(self.error(batch.len(), attempt, cause));
                }
                Err(EmbedCallError::Transport(cause)) => {
                    if attempt >= self.config.retry_attempts {
                        return Err(self.error(batch.len(), attempt, cause));
                    }
                    let delay = self.config.retry_delay * attempt;
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "embedding batch failed, retrying: {}",
                        cause
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn error(&self, batch_size: usize, attempts: u32, cause: String) -> EmbeddingError {
        EmbeddingError {
            model: self.model.model_name().to_string(),
            batch_size,
            attempts,
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {}", i)).collect()
    }

    fn fast_config() -> EmbedderConfig {
        EmbedderConfig {
            max_batch_size: 10,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1),
            batch_pause: Duration::from_millis(1),
        }
    }

    /// **Scenario**: Empty input returns empty output without touching the model.
    #[tokio::test]
    async fn empty_input_empty_output() {
        let embedder = Embedder::new(Arc::new(MockEmbedding::new(8)));
        let out = embedder.embed(&[]).await.unwrap();
        assert!(out.is_empty());
    }

    /// **Scenario**: Output preserves order and length across batch boundaries.
    #[tokio::test]
    async fn order_and_length_preserved_across_batches() {
        let model = Arc::new(MockEmbedding::new(8));
        let embedder = Embedder::with_config(model.clone(), fast_config());
        let input = texts(25); // 3 batches of 10/10/5
        let out = embedder.embed(&input).await.unwrap();
        assert_eq!(out.len(), 25);

        // Each vector matches a direct single embed of the same text.
        let direct = model.embed(&[input[13].as_str()]).await.unwrap();
        assert_eq!(out[13], direct[0]);
    }

    /// **Scenario**: A transient transport error is retried and succeeds (one
    /// retry, vectors produced, no error surfaced).
    #[tokio::test]
    async fn transport_error_retried() {
        let model = Arc::new(ScriptedEmbedding::failing_first(
            1,
            "Connection timeout",
            8,
        ));
        let embedder = Embedder::with_config(model.clone(), fast_config());
        let out = embedder.embed(&texts(2)).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(model.calls(), 2, "one failure plus one successful retry");
    }

    /// **Scenario**: Exhausted retries surface an EmbeddingError with model,
    /// batch size, and attempt count.
    #[tokio::test]
    async fn exhausted_retries_surface_error() {
        let model = Arc::new(ScriptedEmbedding::failing_first(99, "rate limit", 8));
        let embedder = Embedder::with_config(model.clone(), fast_config());
        let err = embedder.embed(&texts(3)).await.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.batch_size, 3);
        assert!(err.cause.contains("rate limit"));
        assert_eq!(model.calls(), 3);
    }

    /// **Scenario**: A bad response shape is not retried.
    #[tokio::test]
    async fn bad_response_not_retried() {
        let model = Arc::new(ScriptedEmbedding::bad_response("no data field", 8));
        let embedder = Embedder::with_config(model.clone(), fast_config());
        let err = embedder.embed(&texts(2)).await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(model.calls(), 1);
    }
}
