//! Asynchronous indexing: queue consumer, DLQ, and reprocessor.
//!
//! New-content events arrive from a durable queue (at-least-once). The
//! [`EmbeddingPipeline`] parses each delivery, fetches the body from the
//! content store, chunks, embeds, and upserts vectors. Deterministic vector
//! ids make re-delivery safe: at-least-once delivery plus idempotent upsert
//! gives effectively-once indexing. Failures become [`DlqEntry`]s; the
//! [`DlqReprocessor`] retries the retryable ones with exponential backoff.

mod consumer;
mod dlq;
mod event;
mod queue;
mod reprocessor;

pub use consumer::{EmbeddingPipeline, JobOutcome, PipelineConfig};
pub use dlq::{DlqEntry, DlqSink, InMemoryDlq};
pub use event::{ContentEvent, ContentItem, ContentStore, InMemoryContentStore};
pub use queue::{ContentQueue, InMemoryQueue, QueueMessage};
pub use reprocessor::{is_retryable, Disposition, DlqReprocessor};
