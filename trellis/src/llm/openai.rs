//! OpenAI Chat Completions implementation of [`ChatModel`].
//!
//! Uses the real Chat Completions API; requires `OPENAI_API_KEY` (or explicit
//! config). Streaming reads `choices[0].delta.content` from the SSE chunks
//! and forwards each delta immediately; `stream_options` is omitted so the
//! request matches typical clients.

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::message::{Message, Role};

use super::{ChatModel, LlmCallError, TokenChunk};

/// OpenAI Chat Completions client.
pub struct ChatOpenAi {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ChatOpenAi {
    /// Builds a client with the API key from `OPENAI_API_KEY`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Builds a client with custom configuration (API key, base URL).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Sets the sampling temperature (0–2).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Caps the completion length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(m.content.as_str()),
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(m.content.as_str()),
                ),
                Role::Assistant => {
                    ChatCompletionRequestMessage::Assistant((m.content.as_str()).into())
                }
            })
            .collect()
    }

    fn build_request(
        &self,
        messages: &[Message],
        stream: bool,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, LlmCallError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));
        if stream {
            args.stream(true);
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        if let Some(m) = self.max_tokens {
            args.max_completion_tokens(m);
        }
        args.build()
            .map_err(|e| LlmCallError::BadResponse(format!("request build failed: {}", e)))
    }
}

#[async_trait]
impl ChatModel for ChatOpenAi {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmCallError> {
        let request = self.build_request(messages, false)?;
        debug!(model = %self.model, message_count = messages.len(), "openai chat create");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmCallError::Transport(format!("OpenAI API error: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmCallError::BadResponse("no choices in response".into()))?;
        Ok(choice.message.content.unwrap_or_default())
    }

    async fn invoke_stream(
        &self,
        messages: Vec<Message>,
        chunk_tx: mpsc::Sender<TokenChunk>,
    ) -> Result<String, LlmCallError> {
        let request = self.build_request(&messages, true)?;
        debug!(model = %self.model, message_count = messages.len(), "openai chat create_stream");

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| LlmCallError::Transport(format!("OpenAI stream error: {}", e)))?;

        let mut full_content = String::new();
        while let Some(result) = stream.next().await {
            let response = result
                .map_err(|e| LlmCallError::Transport(format!("OpenAI stream error: {}", e)))?;
            for choice in response.choices {
                if let Some(content) = &choice.delta.content {
                    if !content.is_empty() {
                        full_content.push_str(content);
                        let _ = chunk_tx
                            .send(TokenChunk {
                                content: content.clone(),
                            })
                            .await;
                    }
                }
            }
        }
        Ok(full_content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Roles map onto the right request message variants.
    #[test]
    fn messages_map_to_request_variants() {
        let messages = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let request = ChatOpenAi::messages_to_request(&messages);
        assert_eq!(request.len(), 3);
        assert!(matches!(request[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(request[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(
            request[2],
            ChatCompletionRequestMessage::Assistant(_)
        ));
    }

    #[tokio::test]
    #[ignore = "Requires OPENAI_API_KEY"]
    async fn invoke_real_api() {
        std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set for this test");
        let model = ChatOpenAi::new("gpt-4o-mini");
        let text = model.invoke(&[Message::user("Say hi")]).await.unwrap();
        assert!(!text.is_empty());
    }
}
