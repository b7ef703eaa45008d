//! split_rewrite node: pull the query out of the conversation, optionally
//! rewrite it for retrieval.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TrellisError;
use crate::graph::{Next, Node, RunContext};
use crate::llm::LlmAdapter;
use crate::message::{last_user_content, Message};
use crate::state::AgentState;

use super::SPLIT_REWRITE;

const REWRITE_PROMPT: &str = "Rewrite the user's question as one self-contained search query for \
a personal knowledge base. Resolve pronouns from the conversation, split nothing, add nothing. \
Reply with the query only.";

/// Queries this short (in words) get a rewrite pass.
const SHORT_QUERY_WORDS: usize = 4;

/// Extracts `tasks.original_query` from the last user message and, for short,
/// ambiguous, or multi-part queries, asks the LLM for a retrieval-friendly
/// rewrite. Rewrite failures fall back to the original query; this node is
/// never fatal.
pub struct SplitRewriteNode {
    llm: Arc<LlmAdapter>,
}

impl SplitRewriteNode {
    pub fn new(llm: Arc<LlmAdapter>) -> Self {
        Self { llm }
    }

    /// Short queries, pronoun-heavy queries, and multi-part intents benefit
    /// from a rewrite; plain self-contained questions do not.
    fn wants_rewrite(query: &str, history_len: usize) -> bool {
        let words = query.split_whitespace().count();
        if words == 0 {
            return false;
        }
        if words < SHORT_QUERY_WORDS {
            return true;
        }
        let lower = query.to_lowercase();
        let ambiguous = history_len > 1
            && [" it ", " that ", " this ", " they ", " those "]
                .iter()
                .any(|p| lower.contains(p));
        let multi_part = lower.matches('?').count() > 1 || lower.contains(" and also ");
        ambiguous || multi_part
    }
}

#[async_trait]
impl Node<AgentState> for SplitRewriteNode {
    fn id(&self) -> &str {
        SPLIT_REWRITE
    }

    async fn run(
        &self,
        mut state: AgentState,
        _ctx: &RunContext,
    ) -> Result<(AgentState, Next), TrellisError> {
        let query = last_user_content(&state.messages)
            .ok_or_else(|| TrellisError::Validation("no user message in conversation".into()))?
            .trim()
            .to_string();
        state.tasks.original_query = query.clone();

        if Self::wants_rewrite(&query, state.messages.len()) {
            let mut rewrite_messages = vec![Message::system(REWRITE_PROMPT)];
            rewrite_messages.extend(state.messages.iter().rev().take(6).rev().cloned());
            match self.llm.call(&rewrite_messages).await {
                Ok(rewritten) => {
                    let rewritten = rewritten.trim().to_string();
                    if !rewritten.is_empty() && rewritten != query {
                        debug!(original = %query, rewritten = %rewritten, "query rewritten");
                        state.tasks.rewritten_query = Some(rewritten);
                    }
                }
                Err(e) => {
                    // Degrade to the original query.
                    debug!("query rewrite skipped: {}", e);
                    state.record_error(SPLIT_REWRITE, format!("rewrite failed: {}", e));
                }
            }
        }

        Ok((state, Next::Continue))
    }
}
