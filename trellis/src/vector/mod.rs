//! Vector index types and adapter.
//!
//! The index itself is an external collaborator behind [`VectorIndex`];
//! [`InMemoryVectorIndex`] ships for dev and tests. [`VectorAdapter`] owns
//! the batching, retry, and filter-composition policy every caller goes
//! through.

mod adapter;
mod filter;
mod in_memory;

pub use adapter::{VectorAdapter, VectorAdapterConfig};
pub use filter::{IndexFilter, MetaFilter};
pub use in_memory::InMemoryVectorIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sentinel user id marking content visible to all users. Queries filtered by
/// a concrete user id are widened to include this owner.
pub const PUBLIC_USER_ID: &str = "public";

/// Metadata stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMeta {
    pub user_id: String,
    pub content_id: String,
    pub category: String,
    pub mime_type: String,
    /// Creation time of the source content, epoch seconds.
    pub created_at: i64,
    pub version: u32,
}

/// One vector with its id and metadata. Upserts overwrite by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMeta,
}

/// Deterministic vector id: `content:{contentId}:{chunkIndex}`.
///
/// Stable and case-sensitive; re-running a job converges on the same ids, so
/// upserts make reindexing idempotent. Version bumps keep the same ids (newer
/// content replaces older).
pub fn vector_id(content_id: &str, chunk_index: u32) -> String {
    format!("content:{}:{}", content_id, chunk_index)
}

/// One query match from the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMeta,
}

/// Index-wide statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexStats {
    pub vector_count: usize,
    pub dimension: usize,
}

/// Error from the vector index collaborator.
#[derive(Debug, thiserror::Error)]
#[error("vector index: {0}")]
pub struct VectorIndexError(pub String);

/// The external vector index. Upsert is the only write mode.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), VectorIndexError>;

    /// Top-k nearest neighbors for `vector` among records matching `filter`,
    /// sorted by score descending.
    async fn query(
        &self,
        vector: &[f32],
        filter: &IndexFilter,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, VectorIndexError>;

    async fn stats(&self) -> Result<IndexStats, VectorIndexError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Ids are deterministic and case-sensitive.
    #[test]
    fn vector_id_deterministic() {
        assert_eq!(vector_id("c1", 0), "content:c1:0");
        assert_eq!(vector_id("c1", 0), vector_id("c1", 0));
        assert_ne!(vector_id("C1", 0), vector_id("c1", 0));
        assert_ne!(vector_id("c1", 1), vector_id("c1", 0));
    }
}
