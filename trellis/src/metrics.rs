//! Process-wide observability counters.
//!
//! Constructed once at process start and passed down explicitly; producers
//! write, exporters read a snapshot. No global registry.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters for the pipeline, the DLQ reprocessor, and the graph runner.
#[derive(Debug, Default)]
pub struct Metrics {
    pub parsing_errors_processed: AtomicU64,
    pub messages_malformed: AtomicU64,
    pub jobs_indexed: AtomicU64,
    pub jobs_skipped: AtomicU64,
    pub dlq_entries_written: AtomicU64,
    pub dlq_retries_scheduled: AtomicU64,
    pub dlq_exhausted: AtomicU64,
    pub runs_started: AtomicU64,
    pub runs_completed: AtomicU64,
    pub runs_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy for exporters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            parsing_errors_processed: self.parsing_errors_processed.load(Ordering::Relaxed),
            messages_malformed: self.messages_malformed.load(Ordering::Relaxed),
            jobs_indexed: self.jobs_indexed.load(Ordering::Relaxed),
            jobs_skipped: self.jobs_skipped.load(Ordering::Relaxed),
            dlq_entries_written: self.dlq_entries_written.load(Ordering::Relaxed),
            dlq_retries_scheduled: self.dlq_retries_scheduled.load(Ordering::Relaxed),
            dlq_exhausted: self.dlq_exhausted.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of [`Metrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub parsing_errors_processed: u64,
    pub messages_malformed: u64,
    pub jobs_indexed: u64,
    pub jobs_skipped: u64,
    pub dlq_entries_written: u64,
    pub dlq_retries_scheduled: u64,
    pub dlq_exhausted: u64,
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
}

/// Bump a counter by one.
pub fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}
