//! retrieve node: embed the query and pull context from the vector index.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::embed::Embedder;
use crate::error::TrellisError;
use crate::graph::{Next, Node, RunContext};
use crate::pipeline::ContentStore;
use crate::state::{AgentState, RetrievedDoc};
use crate::vector::{MetaFilter, QueryMatch, VectorAdapter};

use super::RETRIEVE;

/// Context bodies are trimmed to this many chars before prompt packing.
const DOC_BODY_MAX_CHARS: usize = 1500;

/// Embeds the active query (normalized to unit length), queries the index
/// with the caller's user filter, and maps matches into `docs` sorted by
/// score descending. Index or embedding failures degrade to empty docs;
/// this node is never fatal.
pub struct RetrieveNode {
    embedder: Arc<Embedder>,
    vectors: Arc<VectorAdapter>,
    content: Arc<dyn ContentStore>,
}

impl RetrieveNode {
    pub fn new(
        embedder: Arc<Embedder>,
        vectors: Arc<VectorAdapter>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            content,
        }
    }

    fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }

    async fn fetch_docs(&self, matches: Vec<QueryMatch>) -> Vec<RetrievedDoc> {
        let mut docs = Vec::with_capacity(matches.len());
        for m in matches {
            let (title, body) = match self.content.fetch(&m.metadata.content_id).await {
                Ok(Some(item)) => {
                    let body: String = item.body.chars().take(DOC_BODY_MAX_CHARS).collect();
                    (item.title, body)
                }
                Ok(None) => (format!("{} {}", m.metadata.category, m.metadata.content_id), String::new()),
                Err(e) => {
                    warn!(content_id = %m.metadata.content_id, "doc body fetch failed: {}", e);
                    (format!("{} {}", m.metadata.category, m.metadata.content_id), String::new())
                }
            };
            docs.push(RetrievedDoc {
                id: m.id,
                score: m.score,
                title,
                body,
                created_at: m.metadata.created_at,
                source_ref: m.metadata.content_id,
            });
        }
        docs
    }
}

#[async_trait]
impl Node<AgentState> for RetrieveNode {
    fn id(&self) -> &str {
        RETRIEVE
    }

    async fn run(
        &self,
        mut state: AgentState,
        _ctx: &RunContext,
    ) -> Result<(AgentState, Next), TrellisError> {
        if !state.options.enhance_with_context {
            state.docs.clear();
            return Ok((state, Next::Continue));
        }

        let query = state.active_query().to_string();
        let top_k = state.tasks.top_k.max(1);

        let vector = match self.embedder.embed_one(&query).await {
            Ok(v) => Self::normalize(v),
            Err(e) => {
                warn!("query embedding failed, retrieving nothing: {}", e);
                state.record_error(RETRIEVE, format!("query embedding failed: {}", e));
                state.docs.clear();
                return Ok((state, Next::Continue));
            }
        };

        let filter = MetaFilter::for_user(&state.user_id);
        match self.vectors.query(&vector, &filter, top_k).await {
            Ok(mut matches) => {
                matches.sort_by(|a, b| b.score.total_cmp(&a.score));
                matches.truncate(top_k);
                debug!(query = %query, top_k, hits = matches.len(), "retrieved context");
                state.docs = self.fetch_docs(matches).await;
            }
            Err(e) => {
                warn!("vector query failed, retrieving nothing: {}", e);
                state.record_error(RETRIEVE, format!("vector query failed: {}", e));
                state.docs.clear();
            }
        }

        Ok((state, Next::Continue))
    }
}
