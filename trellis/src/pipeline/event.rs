//! New-content events and the content store boundary.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TrellisError;
use crate::vector::{VectorMeta, PUBLIC_USER_ID};

/// One new-content event from the queue.
///
/// Wire shape is camelCase JSON; unrecognized fields are ignored, a `null` or
/// missing `userId` means public content. Consumed exactly once, never
/// mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEvent {
    pub id: String,
    #[serde(default = "public_user", deserialize_with = "user_or_public")]
    pub user_id: String,
    pub category: String,
    pub mime_type: String,
    /// Epoch seconds.
    pub created_at: i64,
    pub version: u32,
    pub deleted: bool,
}

fn public_user() -> String {
    PUBLIC_USER_ID.to_string()
}

fn user_or_public<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.unwrap_or_else(public_user))
}

impl ContentEvent {
    /// Parses a raw queue payload. Schema violations and an empty `id` are
    /// parse errors (routed to the DLQ, never retried).
    pub fn parse(raw: &[u8]) -> Result<Self, String> {
        let event: ContentEvent =
            serde_json::from_slice(raw).map_err(|e| format!("invalid content event: {}", e))?;
        if event.id.is_empty() {
            return Err("content event id must be non-empty".into());
        }
        Ok(event)
    }

    /// Vector metadata derived from this event; shared by every chunk of the
    /// content.
    pub fn vector_meta(&self) -> VectorMeta {
        VectorMeta {
            user_id: self.user_id.clone(),
            content_id: self.id.clone(),
            category: self.category.clone(),
            mime_type: self.mime_type.clone(),
            created_at: self.created_at,
            version: self.version,
        }
    }
}

/// Content body as fetched from the content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub deleted: bool,
}

/// External store holding raw content bodies, keyed by content id.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn fetch(&self, content_id: &str) -> Result<Option<ContentItem>, TrellisError>;
}

/// In-memory content store for dev and tests.
#[derive(Default)]
pub struct InMemoryContentStore {
    items: DashMap<String, ContentItem>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: ContentItem) {
        self.items.insert(item.id.clone(), item);
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn fetch(&self, content_id: &str) -> Result<Option<ContentItem>, TrellisError> {
        Ok(self.items.get(content_id).map(|item| item.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: A complete event parses; unknown fields are ignored.
    #[test]
    fn parse_complete_event() {
        let raw = br#"{
            "id": "c1", "userId": "u1", "category": "note",
            "mimeType": "text/markdown", "createdAt": 1700000000,
            "version": 1, "deleted": false, "futureField": "ignored"
        }"#;
        let event = ContentEvent::parse(raw).expect("parse");
        assert_eq!(event.id, "c1");
        assert_eq!(event.user_id, "u1");
        assert_eq!(event.created_at, 1_700_000_000);
    }

    /// **Scenario**: Missing or null userId resolves to the public sentinel.
    #[test]
    fn null_user_is_public() {
        let raw = br#"{
            "id": "c1", "userId": null, "category": "note",
            "mimeType": "text/plain", "createdAt": 1, "version": 1, "deleted": false
        }"#;
        assert_eq!(ContentEvent::parse(raw).unwrap().user_id, PUBLIC_USER_ID);

        let raw = br#"{
            "id": "c1", "category": "note",
            "mimeType": "text/plain", "createdAt": 1, "version": 1, "deleted": false
        }"#;
        assert_eq!(ContentEvent::parse(raw).unwrap().user_id, PUBLIC_USER_ID);
    }

    /// **Scenario**: Missing id and empty id are parse errors.
    #[test]
    fn missing_or_empty_id_rejected() {
        assert!(ContentEvent::parse(br#"{"userId":"u1"}"#).is_err());
        let raw = br#"{
            "id": "", "category": "note",
            "mimeType": "text/plain", "createdAt": 1, "version": 1, "deleted": false
        }"#;
        assert!(ContentEvent::parse(raw).is_err());
        assert!(ContentEvent::parse(b"not json").is_err());
    }

    /// **Scenario**: Vector metadata carries every event field.
    #[test]
    fn vector_meta_from_event() {
        let raw = br#"{
            "id": "c1", "userId": "u1", "category": "note",
            "mimeType": "text/markdown", "createdAt": 1700000000,
            "version": 3, "deleted": false
        }"#;
        let meta = ContentEvent::parse(raw).unwrap().vector_meta();
        assert_eq!(meta.content_id, "c1");
        assert_eq!(meta.user_id, "u1");
        assert_eq!(meta.version, 3);
        assert_eq!(meta.mime_type, "text/markdown");
    }

    /// **Scenario**: The in-memory store round-trips items.
    #[tokio::test]
    async fn in_memory_store_roundtrip() {
        let store = InMemoryContentStore::new();
        store.insert(ContentItem {
            id: "c1".into(),
            title: "Note".into(),
            body: "body".into(),
            deleted: false,
        });
        let item = store.fetch("c1").await.unwrap().expect("present");
        assert_eq!(item.title, "Note");
        assert!(store.fetch("missing").await.unwrap().is_none());
    }
}
