use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation, as persisted and exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub role: Role,
    pub content: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
}

impl Message {
    pub fn new(id: u64, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn user(id: u64, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content)
    }

    pub fn assistant(id: u64, content: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, content)
    }

    pub fn to_relay(&self) -> RelayMessage {
        RelayMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// The `{role, content}` pair sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub role: Role,
    pub content: String,
}

impl RelayMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Creation-time derived ids that never repeat or go backwards, even when
/// two messages are created within the same millisecond.
#[derive(Debug, Clone, Default)]
pub struct IdClock {
    last: u64,
}

impl IdClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue after the highest id already in use.
    pub fn after(last: u64) -> Self {
        Self { last }
    }

    pub fn next_id(&mut self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.last = now.max(self.last.saturating_add(1));
        self.last
    }
}
