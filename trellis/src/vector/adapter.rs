//! Vector adapter: batching, retry, and filter-composition policy.
//!
//! Everything that talks to the index goes through here. Upserts are batched
//! and retried with linear backoff; an exhausted batch is fatal for the
//! caller's job (the pipeline routes it to the DLQ). Queries are not retried;
//! the caller decides.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::TrellisError;

use super::{IndexStats, MetaFilter, QueryMatch, VectorIndex, VectorRecord};

/// Allowed range for `top_k` on queries.
const TOP_K_MIN: usize = 1;
const TOP_K_MAX: usize = 1000;

#[derive(Debug, Clone)]
pub struct VectorAdapterConfig {
    pub max_batch_size: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for VectorAdapterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Batched upsert/query against the vector index.
#[derive(Clone)]
pub struct VectorAdapter {
    index: Arc<dyn VectorIndex>,
    config: VectorAdapterConfig,
}

impl VectorAdapter {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            config: VectorAdapterConfig::default(),
        }
    }

    pub fn with_config(index: Arc<dyn VectorIndex>, config: VectorAdapterConfig) -> Self {
        Self { index, config }
    }

    /// Upserts all records in sub-batches of `max_batch_size`, each retried up
    /// to `retry_attempts` with linear backoff. The first exhausted batch
    /// fails the whole call.
    pub async fn upsert(&self, records: &[VectorRecord]) -> Result<(), TrellisError> {
        for batch in records.chunks(self.config.max_batch_size) {
            self.upsert_batch(batch).await?;
        }
        Ok(())
    }

    async fn upsert_batch(&self, batch: &[VectorRecord]) -> Result<(), TrellisError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.index.upsert(batch).await {
                Ok(()) => {
                    debug!(batch_size = batch.len(), attempt, "upserted batch");
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.config.retry_attempts {
                        return Err(TrellisError::Vectorize(format!(
                            "upsert failed after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    let delay = self.config.retry_delay * attempt;
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "upsert batch failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Queries with the composed filter (public-content merge applied here).
    /// `top_k` is clamped into `[1, 1000]`. No retry; the caller decides.
    pub async fn query(
        &self,
        vector: &[f32],
        filter: &MetaFilter,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, TrellisError> {
        let top_k = top_k.clamp(TOP_K_MIN, TOP_K_MAX);
        let composed = filter.compose();
        self.index
            .query(vector, &composed, top_k)
            .await
            .map_err(|e| TrellisError::Vectorize(e.to_string()))
    }

    pub async fn stats(&self) -> Result<IndexStats, TrellisError> {
        self.index
            .stats()
            .await
            .map_err(|e| TrellisError::Vectorize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::vector::{
        vector_id, IndexFilter, InMemoryVectorIndex, VectorIndexError, VectorMeta, PUBLIC_USER_ID,
    };

    fn record(content_id: &str, chunk: u32, user_id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: vector_id(content_id, chunk),
            values,
            metadata: VectorMeta {
                user_id: user_id.into(),
                content_id: content_id.into(),
                category: "note".into(),
                mime_type: "text/plain".into(),
                created_at: 1_700_000_000,
                version: 1,
            },
        }
    }

    fn fast_config() -> VectorAdapterConfig {
        VectorAdapterConfig {
            max_batch_size: 2,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1),
        }
    }

    /// Index that fails the first `fail_count` upsert calls.
    struct FlakyIndex {
        inner: InMemoryVectorIndex,
        fail_count: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn upsert(&self, records: &[VectorRecord]) -> Result<(), VectorIndexError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_count {
                return Err(VectorIndexError("connection reset".into()));
            }
            self.inner.upsert(records).await
        }
        async fn query(
            &self,
            vector: &[f32],
            filter: &IndexFilter,
            top_k: usize,
        ) -> Result<Vec<QueryMatch>, VectorIndexError> {
            self.inner.query(vector, filter, top_k).await
        }
        async fn stats(&self) -> Result<IndexStats, VectorIndexError> {
            self.inner.stats().await
        }
    }

    /// **Scenario**: Large upserts split into sub-batches; all records land.
    #[tokio::test]
    async fn upsert_batches_all_records() {
        let index = Arc::new(InMemoryVectorIndex::new(2));
        let adapter = VectorAdapter::with_config(index.clone(), fast_config());
        let records: Vec<_> = (0..5)
            .map(|i| record("c1", i, "u1", vec![1.0, 0.0]))
            .collect();
        adapter.upsert(&records).await.unwrap();
        assert_eq!(adapter.stats().await.unwrap().vector_count, 5);
    }

    /// **Scenario**: A flaky index is retried with backoff and succeeds.
    #[tokio::test]
    async fn upsert_retries_then_succeeds() {
        let flaky = Arc::new(FlakyIndex {
            inner: InMemoryVectorIndex::new(2),
            fail_count: 2,
            calls: AtomicUsize::new(0),
        });
        let adapter = VectorAdapter::with_config(flaky.clone(), fast_config());
        adapter
            .upsert(&[record("c1", 0, "u1", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    /// **Scenario**: An exhausted batch surfaces a Vectorize error.
    #[tokio::test]
    async fn upsert_exhaustion_is_fatal() {
        let flaky = Arc::new(FlakyIndex {
            inner: InMemoryVectorIndex::new(2),
            fail_count: 99,
            calls: AtomicUsize::new(0),
        });
        let adapter = VectorAdapter::with_config(flaky, fast_config());
        let err = adapter
            .upsert(&[record("c1", 0, "u1", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, TrellisError::Vectorize(_)));
    }

    /// **Scenario**: Filter safety — a query for user U only ever returns
    /// metadata owned by U or the public sentinel.
    #[tokio::test]
    async fn query_filter_safety() {
        let index = Arc::new(InMemoryVectorIndex::new(2));
        let adapter = VectorAdapter::new(index);
        adapter
            .upsert(&[
                record("mine", 0, "u1", vec![1.0, 0.0]),
                record("shared", 0, PUBLIC_USER_ID, vec![1.0, 0.1]),
                record("theirs", 0, "u2", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let matches = adapter
            .query(&[1.0, 0.0], &MetaFilter::for_user("u1"), 10)
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        for m in &matches {
            assert!(
                m.metadata.user_id == "u1" || m.metadata.user_id == PUBLIC_USER_ID,
                "leaked record owned by {}",
                m.metadata.user_id
            );
        }
    }

    /// **Scenario**: top_k is clamped into [1, 1000].
    #[tokio::test]
    async fn query_clamps_top_k() {
        let index = Arc::new(InMemoryVectorIndex::new(2));
        let adapter = VectorAdapter::new(index);
        adapter
            .upsert(&[record("c1", 0, "u1", vec![1.0, 0.0])])
            .await
            .unwrap();
        // top_k of zero still returns the single best match.
        let matches = adapter
            .query(&[1.0, 0.0], &MetaFilter::for_user("u1"), 0)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
    }
}
