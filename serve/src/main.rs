//! Trellis chat server binary.

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config::load_and_apply("trellis", None::<&std::path::Path>).ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addr = std::env::var("TRELLIS_ADDR").ok();
    serve::run_serve(addr.as_deref()).await
}
