//! Checkpoint type and store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Error type for checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
}

/// Persisted snapshot of a run: the full state plus the last completed node.
///
/// At most one per `run_id`; a newer checkpoint overwrites the older one.
#[derive(Debug, Clone)]
pub struct Checkpoint<S> {
    pub run_id: String,
    pub state: S,
    pub last_node: String,
    pub updated_at: DateTime<Utc>,
}

impl<S> Checkpoint<S> {
    pub fn new(run_id: impl Into<String>, state: S, last_node: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state,
            last_node: last_node.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Saves and loads checkpoints by run id.
///
/// Writes are overwrites keyed by `run_id`; there is no read-modify-write
/// across tasks (each run owns its key). `get`/`delete` also serve
/// operational tooling (run inspection, cleanup).
#[async_trait]
pub trait CheckpointStore<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    /// Persist (insert or overwrite) the checkpoint for its run id.
    async fn put(&self, checkpoint: &Checkpoint<S>) -> Result<(), CheckpointError>;

    /// Load the checkpoint for a run id, if any.
    async fn get(&self, run_id: &str) -> Result<Option<Checkpoint<S>>, CheckpointError>;

    /// Remove the checkpoint for a run id. Removing a missing id is not an error.
    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError>;
}
