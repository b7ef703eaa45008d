//! Chat message types.
//!
//! Roles: System, User, Assistant. Used by `AgentState::messages` and by the
//! LLM adapter when building completion requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a system message stamped now.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message stamped now.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message stamped now.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Content of the last user message in a conversation, if any.
pub fn last_user_content(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Constructors produce the correct role with content.
    #[test]
    fn message_constructors() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        let a = Message::assistant("a");
        assert_eq!(a.role, Role::Assistant);
        assert_eq!(a.content, "a");
    }

    /// **Scenario**: Messages round-trip through serde with lowercase roles.
    #[test]
    fn message_serde_roundtrip() {
        let msg = Message::user("hello");
        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(json.contains("\"user\""));
        let back: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.role, Role::User);
        assert_eq!(back.content, "hello");
    }

    /// **Scenario**: last_user_content skips trailing assistant messages.
    #[test]
    fn last_user_content_finds_latest_user() {
        let msgs = vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
            Message::assistant("reply2"),
        ];
        assert_eq!(last_user_content(&msgs), Some("second"));
        assert_eq!(last_user_content(&[]), None);
    }
}
