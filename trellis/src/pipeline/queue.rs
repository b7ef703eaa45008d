//! Queue boundary for new-content deliveries.
//!
//! The broker is an external collaborator; the pipeline only needs pull and
//! ack. Delivery is at-least-once — the pipeline's idempotent vector keying
//! makes redelivery safe.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::TrellisError;

/// One delivery: opaque receipt for acking plus the raw payload.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub receipt: String,
    pub payload: Vec<u8>,
}

/// Pull/ack interface over the new-content queue.
#[async_trait]
pub trait ContentQueue: Send + Sync {
    /// Up to `max` pending deliveries. May return fewer or none.
    async fn pull(&self, max: usize) -> Result<Vec<QueueMessage>, TrellisError>;

    /// Acknowledge one delivery by receipt.
    async fn ack(&self, receipt: &str) -> Result<(), TrellisError>;
}

/// In-memory queue for dev and tests.
#[derive(Default)]
pub struct InMemoryQueue {
    pending: Mutex<VecDeque<QueueMessage>>,
    acked: Mutex<Vec<String>>,
    next_receipt: AtomicU64,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a payload, returning its receipt.
    pub async fn push(&self, payload: impl Into<Vec<u8>>) -> String {
        let receipt = format!("m{}", self.next_receipt.fetch_add(1, Ordering::SeqCst));
        self.pending.lock().await.push_back(QueueMessage {
            receipt: receipt.clone(),
            payload: payload.into(),
        });
        receipt
    }

    /// Receipts acknowledged so far (test observability).
    pub async fn acked(&self) -> Vec<String> {
        self.acked.lock().await.clone()
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl ContentQueue for InMemoryQueue {
    async fn pull(&self, max: usize) -> Result<Vec<QueueMessage>, TrellisError> {
        let mut pending = self.pending.lock().await;
        let n = pending.len().min(max);
        Ok(pending.drain(..n).collect())
    }

    async fn ack(&self, receipt: &str) -> Result<(), TrellisError> {
        self.acked.lock().await.push(receipt.to_string());
        Ok(())
    }
}
