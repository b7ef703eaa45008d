//! HTTP server for Trellis chat (axum + SSE).
//!
//! `POST /chat` runs the RAG graph and streams `workflow_step` / `answer` /
//! `error` / `done` frames as `text/event-stream`. The process stays alive
//! across per-request failures; individual requests end with `error` then
//! `done` on their own stream.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`app::router`],
//! [`app::AppState`].

pub mod app;
mod chat;

use tokio::net::TcpListener;
use tracing::info;

use app::AppState;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Runs the server on an existing listener. Used by tests (bind to
/// 127.0.0.1:0, then pass the listener).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: std::sync::Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("chat server listening on http://{}", addr);
    let app = app::router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Builds the default wiring from the environment and serves on `addr`
/// (default 127.0.0.1:8080).
pub async fn run_serve(
    addr: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = app::AppState::from_env().await?;
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, std::sync::Arc::new(state)).await
}
