//! SQLite-backed checkpoint store. Persistent across process restarts.
//!
//! One row per run id (`INSERT OR REPLACE`); the state snapshot is stored as
//! JSON. Uses `spawn_blocking` around rusqlite calls.

use std::marker::PhantomData;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};

/// SQLite checkpoint store keyed by run id.
pub struct SqliteSaver<S> {
    db_path: std::path::PathBuf,
    _state: PhantomData<fn() -> S>,
}

impl<S> SqliteSaver<S> {
    /// Opens (or creates) the database and ensures the table exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                run_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                last_node TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(Self {
            db_path,
            _state: PhantomData,
        })
    }
}

#[async_trait]
impl<S> CheckpointStore<S> for SqliteSaver<S>
where
    S: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    async fn put(&self, checkpoint: &Checkpoint<S>) -> Result<(), CheckpointError> {
        let state_json = serde_json::to_string(&checkpoint.state)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let run_id = checkpoint.run_id.clone();
        let last_node = checkpoint.last_node.clone();
        let updated_at = checkpoint.updated_at.to_rfc3339();
        let db_path = self.db_path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO checkpoints (run_id, state, last_node, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![run_id, state_json, last_node, updated_at],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok::<(), CheckpointError>(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    async fn get(&self, run_id: &str) -> Result<Option<Checkpoint<S>>, CheckpointError> {
        let run_id = run_id.to_string();
        let db_path = self.db_path.clone();

        type Row = (String, String, String, String);
        let row: Option<Row> =
            tokio::task::spawn_blocking(move || -> Result<Option<Row>, CheckpointError> {
                let conn = rusqlite::Connection::open(&db_path)
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let mut stmt = conn
                    .prepare(
                        "SELECT run_id, state, last_node, updated_at
                         FROM checkpoints WHERE run_id = ?1",
                    )
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let mut rows = stmt
                    .query(params![run_id])
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let row = match rows
                    .next()
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?
                {
                    Some(r) => r,
                    None => return Ok(None),
                };
                let tuple = (
                    row.get(0).map_err(|e| CheckpointError::Storage(e.to_string()))?,
                    row.get(1).map_err(|e| CheckpointError::Storage(e.to_string()))?,
                    row.get(2).map_err(|e| CheckpointError::Storage(e.to_string()))?,
                    row.get(3).map_err(|e| CheckpointError::Storage(e.to_string()))?,
                );
                Ok(Some(tuple))
            })
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))??;

        let (run_id, state_json, last_node, updated_at) = match row {
            Some(r) => r,
            None => return Ok(None),
        };
        let state: S = serde_json::from_str(&state_json)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?
            .with_timezone(&Utc);
        Ok(Some(Checkpoint {
            run_id,
            state,
            last_node,
            updated_at,
        }))
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        let run_id = run_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            conn.execute("DELETE FROM checkpoints WHERE run_id = ?1", params![run_id])
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok::<(), CheckpointError>(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }
}
