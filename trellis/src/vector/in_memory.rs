//! In-memory vector index for dev and tests. Not persistent.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{IndexFilter, IndexStats, QueryMatch, VectorIndex, VectorIndexError, VectorRecord};

/// Cosine-similarity index over a concurrent map. Upserts overwrite by id.
pub struct InMemoryVectorIndex {
    records: DashMap<String, VectorRecord>,
    dimension: usize,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            records: DashMap::new(),
            dimension,
        }
    }

    /// Returns 0.0 if either vector has zero magnitude.
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), VectorIndexError> {
        for record in records {
            if record.values.len() != self.dimension {
                return Err(VectorIndexError(format!(
                    "dimension mismatch for {}: expected {}, got {}",
                    record.id,
                    self.dimension,
                    record.values.len()
                )));
            }
            self.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &IndexFilter,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, VectorIndexError> {
        let mut matches: Vec<QueryMatch> = self
            .records
            .iter()
            .filter(|entry| filter.matches(&entry.metadata))
            .map(|entry| QueryMatch {
                id: entry.id.clone(),
                score: Self::cosine_similarity(vector, &entry.values),
                metadata: entry.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn stats(&self) -> Result<IndexStats, VectorIndexError> {
        Ok(IndexStats {
            vector_count: self.records.len(),
            dimension: self.dimension,
        })
    }
}
