//! The embedding pipeline: queue consumer orchestrating chunker, embedder,
//! and vector adapter.
//!
//! Per delivery: parse (failures → ParseError DLQ entry, acked), ack valid
//! events exactly once, fetch + chunk + embed in bounded windows, upsert.
//! A failing job dead-letters and the batch moves on; one bad content item
//! never poisons its neighbors.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::Chunker;
use crate::embed::Embedder;
use crate::error::TrellisError;
use crate::metrics::{incr, Metrics};
use crate::vector::{vector_id, VectorAdapter, VectorRecord};

use super::dlq::{DlqEntry, DlqSink};
use super::event::{ContentEvent, ContentStore};
use super::queue::{ContentQueue, QueueMessage};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Hard cap on body length (chars) to bound memory.
    pub max_body_chars: usize,
    /// Chunks embedded per window.
    pub max_chunks_per_batch: usize,
    /// Pause between embedding windows.
    pub window_pause: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_body_chars: 100_000,
            max_chunks_per_batch: 50,
            window_pause: Duration::from_millis(50),
        }
    }
}

/// Outcome of one indexing job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Indexed { chunks: usize },
    Skipped { reason: &'static str },
}

/// Queue consumer for new-content events.
///
/// Single-threaded within a delivery; deliveries may be processed in parallel
/// by the host since each job operates on its own content id and shares no
/// mutable state.
pub struct EmbeddingPipeline {
    content: Arc<dyn ContentStore>,
    chunker: Chunker,
    embedder: Embedder,
    vectors: VectorAdapter,
    dlq: Arc<dyn DlqSink>,
    metrics: Arc<Metrics>,
    config: PipelineConfig,
}

impl EmbeddingPipeline {
    pub fn new(
        content: Arc<dyn ContentStore>,
        chunker: Chunker,
        embedder: Embedder,
        vectors: VectorAdapter,
        dlq: Arc<dyn DlqSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            content,
            chunker,
            embedder,
            vectors,
            dlq,
            metrics,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Processes one queue delivery.
    ///
    /// Malformed messages are acked and dead-lettered (retrying them cannot
    /// help). Valid events are acked exactly once, then indexed; a failing
    /// job becomes an `EmbedError` DLQ entry and the loop continues.
    pub async fn process_batch(&self, messages: Vec<QueueMessage>, queue: &dyn ContentQueue) {
        for message in messages {
            match ContentEvent::parse(&message.payload) {
                Err(error) => {
                    warn!(receipt = %message.receipt, "unparseable content event: {}", error);
                    self.push_dlq(DlqEntry::ParseError {
                        error,
                        original_message: String::from_utf8_lossy(&message.payload).into_owned(),
                    })
                    .await;
                    self.ack(queue, &message.receipt).await;
                }
                Ok(event) => {
                    self.ack(queue, &message.receipt).await;
                    match self.process_job(&event).await {
                        Ok(JobOutcome::Indexed { chunks }) => {
                            info!(content_id = %event.id, user_id = %event.user_id, chunks, "indexed content");
                            incr(&self.metrics.jobs_indexed);
                        }
                        Ok(JobOutcome::Skipped { reason }) => {
                            warn!(content_id = %event.id, reason, "skipped content");
                            incr(&self.metrics.jobs_skipped);
                        }
                        Err(e) => {
                            warn!(content_id = %event.id, "indexing job failed: {}", e);
                            self.push_dlq(DlqEntry::EmbedError {
                                err: e.to_string(),
                                job: event,
                                attempts: 0,
                            })
                            .await;
                        }
                    }
                }
            }
        }
    }

    /// Indexes one content event: fetch, truncate, chunk, embed in windows,
    /// upsert. Chunk upserts happen in increasing index order.
    pub async fn process_job(&self, event: &ContentEvent) -> Result<JobOutcome, TrellisError> {
        if event.deleted {
            return Ok(JobOutcome::Skipped { reason: "deleted" });
        }

        let item = match self.content.fetch(&event.id).await? {
            Some(item) => item,
            None => return Ok(JobOutcome::Skipped { reason: "content not found" }),
        };
        if item.deleted {
            return Ok(JobOutcome::Skipped { reason: "deleted" });
        }
        if item.body.is_empty() {
            return Ok(JobOutcome::Skipped { reason: "empty body" });
        }

        let body = self.truncate_body(&event.id, item.body);
        let mut chunks = self.chunker.process(&body);
        if chunks.is_empty() {
            return Ok(JobOutcome::Skipped { reason: "no chunks" });
        }

        let meta = event.vector_meta();
        let mut records: Vec<VectorRecord> = Vec::with_capacity(chunks.len());
        let mut global_index = 0u32;
        let mut first_window = true;
        while !chunks.is_empty() {
            if !first_window {
                sleep(self.config.window_pause).await;
            }
            first_window = false;

            let take = chunks.len().min(self.config.max_chunks_per_batch);
            let window: Vec<String> = chunks.drain(..take).collect();
            let vectors = self.embedder.embed(&window).await?;
            for values in vectors {
                records.push(VectorRecord {
                    id: vector_id(&event.id, global_index),
                    values,
                    metadata: meta.clone(),
                });
                global_index += 1;
            }
            // Window text is released here, before the next embed call.
            drop(window);
        }

        self.vectors.upsert(&records).await?;
        Ok(JobOutcome::Indexed {
            chunks: records.len(),
        })
    }

    /// Continuous consumer loop: pull, process, pause when idle.
    pub async fn run(
        &self,
        queue: Arc<dyn ContentQueue>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) {
        info!("embedding pipeline consumer started");
        loop {
            if cancel.is_cancelled() {
                info!("embedding pipeline consumer stopping");
                return;
            }
            match queue.pull(16).await {
                Ok(messages) if !messages.is_empty() => {
                    debug!(count = messages.len(), "pulled deliveries");
                    self.process_batch(messages, queue.as_ref()).await;
                }
                Ok(_) => sleep(poll_interval).await,
                Err(e) => {
                    warn!("queue pull failed: {}", e);
                    sleep(poll_interval).await;
                }
            }
        }
    }

    fn truncate_body(&self, content_id: &str, body: String) -> String {
        if body.chars().count() <= self.config.max_body_chars {
            return body;
        }
        let cut = body
            .char_indices()
            .nth(self.config.max_body_chars)
            .map(|(i, _)| i)
            .unwrap_or(body.len());
        warn!(
            content_id = %content_id,
            original_chars = body.chars().count(),
            cap = self.config.max_body_chars,
            "truncating oversized body"
        );
        body[..cut].to_string()
    }

    async fn push_dlq(&self, entry: DlqEntry) {
        incr(&self.metrics.dlq_entries_written);
        if let Err(e) = self.dlq.push(&entry).await {
            // A DLQ outage must not block the pipeline.
            warn!(kind = entry.kind(), "dlq write failed: {}", e);
        }
    }

    async fn ack(&self, queue: &dyn ContentQueue, receipt: &str) {
        if let Err(e) = queue.ack(receipt).await {
            warn!(receipt = %receipt, "ack failed: {}", e);
        }
    }
}
