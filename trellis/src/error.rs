//! Error kinds for the platform.
//!
//! One closed taxonomy shared by the pipeline and the graph. Nodes convert
//! local errors into state annotations where graceful degradation is defined;
//! only `Forbidden`, top-level `Validation`, and exhausted adapter failures
//! surface on the chat stream.

use thiserror::Error;

use crate::embed::EmbeddingError;

/// Platform error.
///
/// `Preprocessing` and `Tool` are always recovered locally (best-effort chunk,
/// per-tool fallback); `Transport` and `Timeout` are the retryable kinds;
/// `Internal` is fatal for the request only, never for the process.
#[derive(Debug, Error)]
pub enum TrellisError {
    /// Malformed input; not retryable.
    #[error("validation: {0}")]
    Validation(String),

    /// Prompt injection or auth refusal.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing content or unknown resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// Embedding model call failed after retries.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Vector index call failed.
    #[error("vector index: {0}")]
    Vectorize(String),

    /// Chunking failure; recovered locally with a best-effort chunk.
    #[error("preprocessing: {0}")]
    Preprocessing(String),

    /// Per-tool failure; recovered via the tool's fallback.
    #[error("tool: {0}")]
    Tool(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Retryable network failure.
    #[error("transport: {0}")]
    Transport(String),

    /// Unexpected failure; fatal for the request only.
    #[error("internal: {0}")]
    Internal(String),
}

impl TrellisError {
    /// Stable error code for the chat stream `error` payload.
    pub fn code(&self) -> &'static str {
        match self {
            TrellisError::Validation(_) => "VALIDATION",
            TrellisError::Forbidden(_) => "FORBIDDEN",
            TrellisError::NotFound(_) => "NOT_FOUND",
            TrellisError::Embedding(_) => "EMBEDDING",
            TrellisError::Vectorize(_) => "VECTORIZE",
            TrellisError::Preprocessing(_) => "PREPROCESSING",
            TrellisError::Tool(_) => "TOOL",
            TrellisError::Timeout(_) => "TIMEOUT",
            TrellisError::Transport(_) => "TRANSPORT",
            TrellisError::Internal(_) => "INTERNAL",
        }
    }
}
