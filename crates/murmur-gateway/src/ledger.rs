//! Storage seams consumed by the relay.
//!
//! Both traits are synchronous; the relay calls them from
//! `tokio::task::spawn_blocking`, the same way the REST handlers reach the
//! database.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use murmur_db::Database;
use murmur_types::models::Message;

/// Durable, append-only message store keyed by the unordered participant pair.
pub trait Ledger: Send + Sync + 'static {
    /// Persist a fully formed record and return its id.
    fn append(&self, msg: &Message) -> Result<Uuid>;

    /// Messages between `a` and `b`, oldest first. Argument order does not matter.
    fn find_conversation(&self, a: &str, b: &str, since: Option<DateTime<Utc>>) -> Result<Vec<Message>>;

    /// Remove every message between `a` and `b`, returning how many went.
    fn delete_conversation(&self, a: &str, b: &str) -> Result<usize>;
}

/// Source of human-readable sender labels.
pub trait ProfileDirectory: Send + Sync + 'static {
    fn display_name(&self, user_id: &str) -> Result<Option<String>>;
}

impl Ledger for Database {
    fn append(&self, msg: &Message) -> Result<Uuid> {
        self.insert_message(msg)?;
        Ok(msg.id)
    }

    fn find_conversation(&self, a: &str, b: &str, since: Option<DateTime<Utc>>) -> Result<Vec<Message>> {
        Database::find_conversation(self, a, b, since)
    }

    fn delete_conversation(&self, a: &str, b: &str) -> Result<usize> {
        Database::delete_conversation(self, a, b)
    }
}

impl ProfileDirectory for Database {
    fn display_name(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.get_user_by_id(user_id)?.and_then(|user| user.display_name()))
    }
}
