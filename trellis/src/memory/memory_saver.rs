//! In-memory checkpoint store. Not persistent; for dev and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};

/// In-memory checkpoint store keyed by run id.
pub struct MemorySaver<S> {
    by_run: RwLock<HashMap<String, Checkpoint<S>>>,
}

impl<S> MemorySaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            by_run: RwLock::new(HashMap::new()),
        }
    }
}

impl<S> Default for MemorySaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> CheckpointStore<S> for MemorySaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn put(&self, checkpoint: &Checkpoint<S>) -> Result<(), CheckpointError> {
        let mut guard = self.by_run.write().await;
        guard.insert(checkpoint.run_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<Checkpoint<S>>, CheckpointError> {
        let guard = self.by_run.read().await;
        Ok(guard.get(run_id).cloned())
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        let mut guard = self.by_run.write().await;
        guard.remove(run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: put overwrites; at most one checkpoint per run id survives.
    #[tokio::test]
    async fn put_overwrites_per_run() {
        let saver: MemorySaver<i32> = MemorySaver::new();
        saver.put(&Checkpoint::new("r1", 1, "a")).await.unwrap();
        saver.put(&Checkpoint::new("r1", 2, "b")).await.unwrap();

        let cp = saver.get("r1").await.unwrap().expect("present");
        assert_eq!(cp.state, 2);
        assert_eq!(cp.last_node, "b");
    }

    /// **Scenario**: get on a missing run id returns None; delete is idempotent.
    #[tokio::test]
    async fn get_missing_and_delete() {
        let saver: MemorySaver<i32> = MemorySaver::new();
        assert!(saver.get("nope").await.unwrap().is_none());
        saver.delete("nope").await.unwrap();

        saver.put(&Checkpoint::new("r1", 1, "a")).await.unwrap();
        saver.delete("r1").await.unwrap();
        assert!(saver.get("r1").await.unwrap().is_none());
    }
}
