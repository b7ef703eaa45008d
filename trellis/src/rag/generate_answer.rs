//! generate_answer node: assemble the prompt, stream the completion.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::TrellisError;
use crate::graph::{Next, Node, RunContext};
use crate::llm::{LlmAdapter, TokenChunk};
use crate::message::Message;
use crate::prompt::{sources, PromptAssembler};
use crate::state::AgentState;
use crate::stream::ChatEvent;

use super::GENERATE_ANSWER;

/// How many trailing conversation messages accompany the system prompt.
const CONVERSATION_TAIL: usize = 12;

/// Builds the final prompt (system + context + tool results + conversation
/// tail) and streams the completion: one `answer{token}` event per chunk,
/// then a final `answer{text, sources}` with cite indices in retrieved doc
/// order. Adapter exhaustion degrades to the fixed apology; the assistant
/// message is always appended.
pub struct GenerateAnswerNode {
    llm: Arc<LlmAdapter>,
    assembler: Arc<PromptAssembler>,
}

impl GenerateAnswerNode {
    pub fn new(llm: Arc<LlmAdapter>, assembler: Arc<PromptAssembler>) -> Self {
        Self { llm, assembler }
    }
}

#[async_trait]
impl Node<AgentState> for GenerateAnswerNode {
    fn id(&self) -> &str {
        GENERATE_ANSWER
    }

    async fn run(
        &self,
        mut state: AgentState,
        ctx: &RunContext,
    ) -> Result<(AgentState, Next), TrellisError> {
        let system_prompt =
            self.assembler
                .build(&state.docs, &state.tasks.tool_results, &state.options);

        let mut prompt_messages = Vec::with_capacity(CONVERSATION_TAIL + 1);
        prompt_messages.push(Message::system(system_prompt));
        let tail_start = state.messages.len().saturating_sub(CONVERSATION_TAIL);
        prompt_messages.extend(state.messages[tail_start..].iter().cloned());

        // Forward streamed chunks as answer tokens while the call is in flight.
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<TokenChunk>(128);
        let events = ctx.events.clone();
        let forward = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                events
                    .emit(ChatEvent::AnswerToken {
                        token: chunk.content,
                    })
                    .await;
            }
        });

        let text = match self.llm.call_stream(&prompt_messages, chunk_tx).await {
            Ok(text) => text,
            Err(e) => {
                warn!("answer generation exhausted the adapter: {}", e);
                state.record_error(GENERATE_ANSWER, e.to_string());
                let apology = self.llm.fallback_message().to_string();
                ctx.events
                    .emit(ChatEvent::AnswerToken {
                        token: apology.clone(),
                    })
                    .await;
                apology
            }
        };
        let _ = forward.await;

        ctx.events
            .emit(ChatEvent::AnswerFinal {
                text: text.clone(),
                sources: sources(&state.docs),
            })
            .await;

        state.messages.push(Message::assistant(text));
        Ok((state, Next::Continue))
    }
}
