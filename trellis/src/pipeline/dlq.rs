//! Dead-letter queue entries and sink.
//!
//! A closed tagged union: anything that does not parse as a known variant is
//! classified `Unknown` at the boundary instead of leaking a serde error into
//! the reprocessor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::TrellisError;

use super::event::ContentEvent;

/// One dead-lettered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DlqEntry {
    /// The queue payload did not parse as a content event. Never retried.
    ParseError {
        error: String,
        original_message: String,
    },
    /// Indexing a valid event failed. `attempts` is incremented by the queue
    /// system on each redelivery.
    EmbedError {
        err: String,
        job: ContentEvent,
        attempts: u32,
    },
    /// Unrecognized DLQ payload.
    Unknown { raw: String },
}

impl DlqEntry {
    /// Parses a raw DLQ payload; anything unrecognized becomes `Unknown`.
    pub fn parse(raw: &[u8]) -> Self {
        serde_json::from_slice(raw).unwrap_or_else(|_| DlqEntry::Unknown {
            raw: String::from_utf8_lossy(raw).into_owned(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DlqEntry::ParseError { .. } => "parse_error",
            DlqEntry::EmbedError { .. } => "embed_error",
            DlqEntry::Unknown { .. } => "unknown",
        }
    }
}

/// Write side of the DLQ. Writes may fail; the pipeline logs and moves on —
/// a DLQ outage must never block indexing.
#[async_trait]
pub trait DlqSink: Send + Sync {
    async fn push(&self, entry: &DlqEntry) -> Result<(), TrellisError>;
}

/// In-memory DLQ for dev and tests.
#[derive(Default)]
pub struct InMemoryDlq {
    entries: Mutex<Vec<DlqEntry>>,
}

impl InMemoryDlq {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<DlqEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl DlqSink for InMemoryDlq {
    async fn push(&self, entry: &DlqEntry) -> Result<(), TrellisError> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Each variant round-trips through its tagged JSON shape.
    #[test]
    fn dlq_entry_roundtrip() {
        let event = ContentEvent::parse(
            br#"{"id":"c1","userId":"u1","category":"note","mimeType":"text/plain",
                "createdAt":1,"version":1,"deleted":false}"#,
        )
        .unwrap();
        let entry = DlqEntry::EmbedError {
            err: "rate limit".into(),
            job: event,
            attempts: 1,
        };
        let json = serde_json::to_vec(&entry).unwrap();
        let back = DlqEntry::parse(&json);
        assert!(matches!(
            back,
            DlqEntry::EmbedError { attempts: 1, ref err, .. } if err == "rate limit"
        ));
    }

    /// **Scenario**: Unknown payloads degrade to the Unknown variant, not an error.
    #[test]
    fn unknown_payload_becomes_unknown_variant() {
        let entry = DlqEntry::parse(b"{\"kind\":\"surprise\"}");
        assert!(matches!(entry, DlqEntry::Unknown { .. }));
        let entry = DlqEntry::parse(b"not json at all");
        assert!(matches!(entry, DlqEntry::Unknown { ref raw } if raw.contains("not json")));
    }

    /// **Scenario**: The in-memory sink accumulates entries.
    #[tokio::test]
    async fn in_memory_sink_accumulates() {
        let dlq = InMemoryDlq::new();
        dlq.push(&DlqEntry::Unknown { raw: "x".into() })
            .await
            .unwrap();
        assert_eq!(dlq.len().await, 1);
        assert_eq!(dlq.entries().await[0].kind(), "unknown");
    }
}
