//! Database schema and checkpoint record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row per thread. The whole message list is stored as a JSON array so a
/// checkpoint replaces history atomically.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY,
    model TEXT,
    version INTEGER NOT NULL DEFAULT 0,
    messages TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_threads_updated ON threads(updated_at DESC);
";

/// Longest accepted thread identifier, in bytes.
pub const MAX_THREAD_ID_LEN: usize = 256;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single conversation message.
///
/// Assistant messages start out streaming and accumulate tokens until sealed.
/// Once sealed the content can no longer change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    streaming: bool,
}

impl Message {
    /// A sealed user message
    pub fn user(
        id: impl Into<String>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: content.into(),
            created_at,
            streaming: false,
        }
    }

    /// A sealed assistant message with its final content
    pub fn assistant(
        id: impl Into<String>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            created_at,
            streaming: false,
        }
    }

    /// An empty assistant message that will receive streamed tokens
    pub fn assistant_streaming(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: String::new(),
            created_at,
            streaming: true,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Append a token. Returns false (and leaves the content untouched) if
    /// the message is already sealed.
    pub fn append(&mut self, token: &str) -> bool {
        if !self.streaming {
            return false;
        }
        self.content.push_str(token);
        true
    }

    #[must_use]
    pub fn seal(mut self) -> Self {
        self.streaming = false;
        self
    }
}

/// The durable snapshot of a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointRecord {
    pub thread_id: String,
    pub messages: Vec<Message>,
    /// Monotonic per thread; 0 means nothing has been committed yet.
    pub version: i64,
    /// Per-thread model override, if one was set
    pub model: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointRecord {
    /// The implicit record of a thread that has never been committed
    pub fn empty(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            version: 0,
            model: None,
            updated_at: Utc::now(),
        }
    }
}
