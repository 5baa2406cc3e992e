use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity reference as it appears inside delivery payloads: `{ "id": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
}

impl UserRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// The unordered pair of participants a direct message belongs to.
///
/// Conversations are never stored as entities. Every read, write and delete
/// derives the pair through `Conversation::new`, which sorts the two ids, so
/// `(a, b)` and `(b, a)` always address the same history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conversation {
    low: String,
    high: String,
}

impl Conversation {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self { low: a.to_string(), high: b.to_string() }
        } else {
            Self { low: b.to_string(), high: a.to_string() }
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }
}

/// A persisted direct message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub sender_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn conversation(&self) -> Conversation {
        Conversation::new(&self.sender, &self.receiver)
    }
}
