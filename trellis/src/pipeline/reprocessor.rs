//! DLQ reprocessor: classify entries, retry the retryable with backoff.
//!
//! Parse errors and unknown payloads are acknowledged (retrying malformed
//! input cannot help); embed errors are retried while the failure message
//! looks transient and the attempt budget holds.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::metrics::{incr, Metrics};

use super::dlq::DlqEntry;

/// Failure-message fragments considered transient (case-insensitive substring).
const RETRYABLE_FRAGMENTS: [&str; 17] = [
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "failed to establish connection",
    "network",
    "throttle",
    "rate limit",
    "too many requests",
    "service unavailable",
    "internal server error",
    "503",
    "500",
    "temporarily unavailable",
    "overloaded",
    "try again",
    "resource exhausted",
];

/// Whether a failure message looks transient. Messages like "invalid",
/// "bad request", "unauthorized", "not found", "400", "404", "validation",
/// "schema" fall through to non-retryable.
pub fn is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// What to do with a DLQ delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge and drop.
    Ack,
    /// Redeliver after the delay.
    Retry { delay: Duration },
}

/// Classifies DLQ entries and schedules retries with exponential backoff.
pub struct DlqReprocessor {
    metrics: Arc<Metrics>,
    max_attempts: u32,
    base_delay_secs: u64,
}

impl DlqReprocessor {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            max_attempts: 3,
            base_delay_secs: 30,
        }
    }

    /// Parses a raw DLQ payload (unknown shapes degrade to `Unknown`) and
    /// classifies it.
    pub fn handle(&self, raw: &[u8]) -> Disposition {
        self.classify(&DlqEntry::parse(raw))
    }

    /// Classification per entry kind. Retry delay is `30 × 2^attempts`
    /// seconds (60, 120); entries at or past the attempt cap are acked.
    pub fn classify(&self, entry: &DlqEntry) -> Disposition {
        match entry {
            DlqEntry::ParseError {
                error,
                original_message,
            } => {
                let (content_id, user_id) = extract_ids(original_message);
                info!(
                    content_id = content_id.as_deref().unwrap_or("?"),
                    user_id = user_id.as_deref().unwrap_or("?"),
                    "dropping unparseable message: {}",
                    error
                );
                incr(&self.metrics.parsing_errors_processed);
                Disposition::Ack
            }
            DlqEntry::EmbedError { err, job, attempts } => {
                if is_retryable(err) && *attempts < self.max_attempts {
                    let delay_secs = self.base_delay_secs * 2u64.pow(*attempts);
                    info!(
                        content_id = %job.id,
                        attempts,
                        delay_secs,
                        "scheduling embed retry: {}",
                        err
                    );
                    incr(&self.metrics.dlq_retries_scheduled);
                    Disposition::Retry {
                        delay: Duration::from_secs(delay_secs),
                    }
                } else {
                    info!(content_id = %job.id, attempts, "embed error exhausted: {}", err);
                    incr(&self.metrics.dlq_exhausted);
                    Disposition::Ack
                }
            }
            DlqEntry::Unknown { .. } => {
                incr(&self.metrics.messages_malformed);
                Disposition::Ack
            }
        }
    }
}

/// Best-effort content/user id extraction from a raw original message.
fn extract_ids(original_message: &str) -> (Option<String>, Option<String>) {
    let value: serde_json::Value = match serde_json::from_str(original_message) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };
    let content_id = value.get("id").and_then(|v| v.as_str()).map(String::from);
    let user_id = value
        .get("userId")
        .and_then(|v| v.as_str())
        .map(String::from);
    (content_id, user_id)
}
