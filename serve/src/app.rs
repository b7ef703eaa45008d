//! Axum app: state, router, and default wiring from the environment.

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use tracing::info;

use trellis::embed::{Embedder, MockEmbedding, OpenAiEmbedding};
use trellis::llm::{ChatOpenAi, LlmAdapter, MockChat};
use trellis::memory::{CheckpointStore, MemorySaver, SqliteSaver};
use trellis::metrics::Metrics;
use trellis::pipeline::InMemoryContentStore;
use trellis::prompt::{InjectionFilter, PromptAssembler};
use trellis::rag::{RagDeps, RagRunner, ToolRunConfig, WidenConfig};
use trellis::state::AgentState;
use trellis::tools::ToolRegistry;
use trellis::vector::{InMemoryVectorIndex, VectorAdapter};

use super::chat::chat_handler;

/// Shared server state: the compiled runner plus process metrics.
pub struct AppState {
    pub runner: Arc<RagRunner>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Default wiring from the environment.
    ///
    /// With `OPENAI_API_KEY` set, real OpenAI bindings are used for chat and
    /// embeddings; otherwise mock models (offline development). Checkpoints
    /// go to SQLite when `TRELLIS_CHECKPOINT_DB` names a path, else stay in
    /// memory. The vector index itself is an external service in production;
    /// this build ships the in-memory index.
    pub async fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let metrics = Arc::new(Metrics::new());

        let has_openai = std::env::var("OPENAI_API_KEY").is_ok();
        let (llm, embedder, dimension) = if has_openai {
            let chat_model =
                std::env::var("TRELLIS_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            let embed_model = std::env::var("TRELLIS_EMBED_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string());
            let embedding = OpenAiEmbedding::new(embed_model);
            let dimension = trellis::embed::EmbeddingModel::dimension(&embedding);
            info!(chat_model = %chat_model, dimension, "using OpenAI bindings");
            (
                LlmAdapter::new(Arc::new(ChatOpenAi::new(chat_model))),
                Embedder::new(Arc::new(embedding)),
                dimension,
            )
        } else {
            info!("OPENAI_API_KEY not set; using mock models");
            let dimension = 64;
            (
                LlmAdapter::new(Arc::new(MockChat::new(
                    "No model binding is configured on this server.",
                ))),
                Embedder::new(Arc::new(MockEmbedding::new(dimension))),
                dimension,
            )
        };

        let checkpoints: Arc<dyn CheckpointStore<AgentState>> =
            match std::env::var("TRELLIS_CHECKPOINT_DB") {
                Ok(path) => {
                    info!(path = %path, "sqlite checkpoint store");
                    Arc::new(SqliteSaver::new(path)?)
                }
                Err(_) => Arc::new(MemorySaver::new()),
            };

        let deps = RagDeps {
            llm: Arc::new(llm),
            embedder: Arc::new(embedder),
            vectors: Arc::new(VectorAdapter::new(Arc::new(InMemoryVectorIndex::new(
                dimension,
            )))),
            content: Arc::new(InMemoryContentStore::new()),
            tools: Arc::new(ToolRegistry::with_builtin_tools()),
            assembler: Arc::new(PromptAssembler::default()),
            injection: Arc::new(InjectionFilter::new()),
            widen: WidenConfig::default(),
            tool_run: ToolRunConfig::default(),
        };
        let runner = RagRunner::new(&deps, Some(checkpoints), metrics.clone())?;
        Ok(Self {
            runner: Arc::new(runner),
            metrics,
        })
    }

    /// State around an already-built runner (tests, embedded setups).
    pub fn with_runner(runner: Arc<RagRunner>, metrics: Arc<Metrics>) -> Self {
        Self { runner, metrics }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.metrics.snapshot()).unwrap_or_default())
}
