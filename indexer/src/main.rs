//! Trellis indexing consumer.
//!
//! Reads content items and new-content events from NDJSON spool files (the
//! dev stand-in for the content store and the durable queue), runs the
//! embedding pipeline over every delivery, then drains the dead-letter queue
//! with the reprocessor's backoff schedule. Exits non-zero only on startup
//! configuration errors; per-job failures are the DLQ's business.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trellis::chunk::Chunker;
use trellis::embed::{Embedder, EmbeddingModel, MockEmbedding, OpenAiEmbedding};
use trellis::metrics::Metrics;
use trellis::pipeline::{
    ContentItem, ContentQueue, Disposition, DlqEntry, DlqReprocessor, EmbeddingPipeline,
    InMemoryContentStore, InMemoryDlq, InMemoryQueue,
};
use trellis::vector::{InMemoryVectorIndex, VectorAdapter, VectorIndex};

/// Exit code for startup configuration errors.
const EXIT_CONFIG: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "indexer")]
#[command(about = "Trellis indexer — run the embedding pipeline over an event spool")]
struct Args {
    /// NDJSON file of new-content events (one queue message per line)
    #[arg(long, value_name = "PATH")]
    events: PathBuf,

    /// NDJSON file of content items (id, title, body, deleted)
    #[arg(long, value_name = "PATH")]
    content: PathBuf,

    /// Cap on the actual wait for scheduled DLQ retries, seconds
    /// (the schedule itself is still 30 × 2^attempts)
    #[arg(long, value_name = "SECS", default_value_t = 2)]
    retry_wait_cap_secs: u64,
}

fn load_content_store(path: &PathBuf) -> Result<InMemoryContentStore, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read content file {}: {}", path.display(), e))?;
    let store = InMemoryContentStore::new();
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item: ContentItem = serde_json::from_str(line).map_err(|e| {
            format!(
                "bad content item at {}:{}: {}",
                path.display(),
                line_no + 1,
                e
            )
        })?;
        store.insert(item);
    }
    Ok(store)
}

async fn load_event_queue(path: &PathBuf) -> Result<InMemoryQueue, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read events file {}: {}", path.display(), e))?;
    let queue = InMemoryQueue::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        // Malformed event lines are data, not config: they flow through the
        // pipeline's ParseError path.
        queue.push(line.as_bytes().to_vec()).await;
    }
    Ok(queue)
}

fn build_embedder() -> (Embedder, usize) {
    if std::env::var("OPENAI_API_KEY").is_ok() {
        let model = std::env::var("TRELLIS_EMBED_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let embedding = OpenAiEmbedding::new(model);
        let dimension = embedding.dimension();
        info!(dimension, "using OpenAI embeddings");
        (Embedder::new(Arc::new(embedding)), dimension)
    } else {
        info!("OPENAI_API_KEY not set; using mock embeddings");
        let dimension = 64;
        (Embedder::new(Arc::new(MockEmbedding::new(dimension))), dimension)
    }
}

/// Drains the DLQ: retryable entries are re-run after their (capped) backoff,
/// re-entering the queue with attempts bumped, until exhausted or indexed.
async fn drain_dlq(
    pipeline: &EmbeddingPipeline,
    reprocessor: &DlqReprocessor,
    entries: Vec<DlqEntry>,
    wait_cap: Duration,
) {
    let mut pending: VecDeque<DlqEntry> = entries.into();
    while let Some(entry) = pending.pop_front() {
        match reprocessor.classify(&entry) {
            Disposition::Ack => {}
            Disposition::Retry { delay } => {
                let wait = delay.min(wait_cap);
                info!(
                    scheduled_secs = delay.as_secs(),
                    waiting_secs = wait.as_secs(),
                    "delaying dlq retry"
                );
                sleep(wait).await;
                if let DlqEntry::EmbedError { job, attempts, .. } = entry {
                    match pipeline.process_job(&job).await {
                        Ok(outcome) => info!(content_id = %job.id, ?outcome, "dlq retry succeeded"),
                        Err(e) => {
                            warn!(content_id = %job.id, "dlq retry failed: {}", e);
                            pending.push_back(DlqEntry::EmbedError {
                                err: e.to_string(),
                                job,
                                attempts: attempts + 1,
                            });
                        }
                    }
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    config::load_and_apply("trellis", None::<&std::path::Path>).ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let content = match load_content_store(&args.content) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("indexer: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };
    let queue = match load_event_queue(&args.events).await {
        Ok(queue) => Arc::new(queue),
        Err(e) => {
            eprintln!("indexer: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    let (embedder, dimension) = build_embedder();
    let index = Arc::new(InMemoryVectorIndex::new(dimension));
    let dlq = Arc::new(InMemoryDlq::new());
    let metrics = Arc::new(Metrics::new());
    let pipeline = EmbeddingPipeline::new(
        content,
        Chunker::default(),
        embedder,
        VectorAdapter::new(index.clone()),
        dlq.clone(),
        metrics.clone(),
    );

    loop {
        let messages = match queue.pull(16).await {
            Ok(messages) if !messages.is_empty() => messages,
            _ => break,
        };
        pipeline.process_batch(messages, queue.as_ref()).await;
    }

    let reprocessor = DlqReprocessor::new(metrics.clone());
    drain_dlq(
        &pipeline,
        &reprocessor,
        dlq.entries().await,
        Duration::from_secs(args.retry_wait_cap_secs),
    )
    .await;

    let stats = index.stats().await.ok();
    let summary = serde_json::json!({
        "metrics": metrics.snapshot(),
        "index": stats.map(|s| serde_json::json!({
            "vectorCount": s.vector_count,
            "dimension": s.dimension,
        })),
    });
    println!("{}", summary);
}
