//! Message value objects.
//!
//! A `Message` is one entry in a conversation history. Its `id` is its
//! zero-based position in the owning [`History`](crate::history::History)
//! as of the last renumbering pass — never a random identifier. Flags are
//! free-form tags used for filtering, never for ordering.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (rendered per-iteration, plus summary markers)
    System,
    /// The end user, including synthetic continuation messages
    User,
    /// The model
    Assistant,
}

/// Tags attached to a message for downstream filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFlag {
    /// The freshly rendered system instruction; stripped and re-rendered
    /// on every context assembly so it is never stale.
    IsSystemInstruction,
    /// A synthetic nudge injected when the model took no action.
    IsSystemResponse,
    /// The wrapped output (or error text) of a tool execution.
    IsToolResult,
    /// A summary marker produced by history compaction.
    IsSummary,
}

/// A single message in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Position of this message in its owning history (assigned on insert,
    /// kept in sync by renumbering).
    pub id: usize,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Filtering tags
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub flags: BTreeSet<MessageFlag>,

    /// When this message was created
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: 0,
            role,
            content: content.into(),
            flags: BTreeSet::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Attach a flag to this message (builder-style).
    pub fn with_flag(mut self, flag: MessageFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    /// Whether this message carries the given flag.
    pub fn has_flag(&self, flag: MessageFlag) -> bool {
        self.flags.contains(&flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.flags.is_empty());
    }

    #[test]
    fn flags_attach_and_query() {
        let msg = Message::user("tool output").with_flag(MessageFlag::IsToolResult);
        assert!(msg.has_flag(MessageFlag::IsToolResult));
        assert!(!msg.has_flag(MessageFlag::IsSummary));
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::system("instructions").with_flag(MessageFlag::IsSystemInstruction);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"system""#));
        assert!(json.contains("is_system_instruction"));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert!(back.has_flag(MessageFlag::IsSystemInstruction));
    }

    #[test]
    fn empty_flags_not_serialized() {
        let msg = Message::user("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("flags"));
    }
}
