//! OpenAI Embeddings implementation of [`EmbeddingModel`].
//!
//! Uses OpenAI's Embeddings API. Requires `OPENAI_API_KEY` (or explicit
//! config). Default model is `text-embedding-3-small` (1536 dimensions).

use async_openai::{
    config::OpenAIConfig,
    types::embeddings::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};
use async_trait::async_trait;

use super::{EmbedCallError, EmbeddingModel};

/// OpenAI Embeddings client.
pub struct OpenAiEmbedding {
    config: OpenAIConfig,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedding {
    /// Builds a client with the API key from `OPENAI_API_KEY`.
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        let dimensions = Self::model_dimensions(&model);
        Self {
            config: OpenAIConfig::new(),
            model,
            dimensions,
        }
    }

    /// Builds a client with custom configuration (API key, base URL).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimensions = Self::model_dimensions(&model);
        Self {
            config,
            model,
            dimensions,
        }
    }

    fn model_dimensions(model: &str) -> usize {
        match model {
            "text-embedding-3-large" => 3072,
            "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
            _ => 1536,
        }
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedCallError> {
        let inputs: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let input = if inputs.len() == 1 {
            EmbeddingInput::String(inputs.into_iter().next().unwrap_or_default())
        } else {
            EmbeddingInput::StringArray(inputs)
        };

        let request = CreateEmbeddingRequest {
            input,
            model: self.model.clone(),
            ..Default::default()
        };

        let client = Client::with_config(self.config.clone());
        let response = client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| EmbedCallError::Transport(format!("OpenAI API error: {}", e)))?;

        if response.data.len() != texts.len() {
            return Err(EmbedCallError::BadResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        Ok(response.data.into_iter().map(|e| e.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_dimensions_map() {
        assert_eq!(OpenAiEmbedding::new("text-embedding-3-small").dimension(), 1536);
        assert_eq!(OpenAiEmbedding::new("text-embedding-3-large").dimension(), 3072);
        assert_eq!(OpenAiEmbedding::new("unknown-model").dimension(), 1536);
    }

    #[tokio::test]
    #[ignore = "Requires OPENAI_API_KEY"]
    async fn embed_real_api() {
        std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set for this test");
        let model = OpenAiEmbedding::new("text-embedding-3-small");
        let vectors = model.embed(&["Hello, world!", "The quick brown fox"]).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 1536);
    }
}
