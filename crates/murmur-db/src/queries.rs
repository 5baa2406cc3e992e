use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

use murmur_types::models::{Conversation, Message};

use crate::Database;
use crate::models::{MessageRow, UserRow, format_timestamp, parse_timestamp};

const USER_COLUMNS: &str = "id, email, password, first_name, last_name, color, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, first_name, last_name) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, email, password_hash, first_name, last_name),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Returns false when no user has this id. `color` is left untouched when `None`.
    pub fn update_profile(
        &self,
        id: &str,
        first_name: &str,
        last_name: &str,
        color: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET first_name = ?2, last_name = ?3, color = COALESCE(?4, color) WHERE id = ?1",
                rusqlite::params![id, first_name, last_name, color],
            )?;
            Ok(changed > 0)
        })
    }

    /// Case-insensitive substring match over email, first and last name.
    pub fn search_users(&self, term: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE instr(lower(email), lower(?1)) > 0
                    OR instr(lower(first_name), lower(?1)) > 0
                    OR instr(lower(last_name), lower(?1)) > 0
                 ORDER BY first_name, last_name"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([term], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every user, optionally leaving one out (usually the caller).
    pub fn list_users(&self, except: Option<&str>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE ?1 IS NULL OR id != ?1 ORDER BY first_name, last_name"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([except], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Contacts --

    /// Adds `contact_id` to the owner's list. Returns false if it was already there.
    pub fn add_contact(&self, owner_id: &str, contact_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO contacts (owner_id, contact_id) VALUES (?1, ?2)",
                (owner_id, contact_id),
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_contacts(&self, owner_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.email, u.password, u.first_name, u.last_name, u.color, u.created_at
                 FROM contacts c
                 JOIN users u ON u.id = c.contact_id
                 WHERE c.owner_id = ?1
                 ORDER BY c.created_at, u.first_name",
            )?;
            let rows = stmt
                .query_map([owner_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message to the ledger. The record's id and timestamp are
    /// assigned by the caller before the write.
    pub fn insert_message(&self, msg: &Message) -> Result<()> {
        let pair = msg.conversation();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, pair_low, pair_high, content, sender_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    msg.id.to_string(),
                    msg.sender,
                    msg.receiver,
                    pair.low(),
                    pair.high(),
                    msg.content,
                    msg.sender_name,
                    format_timestamp(&msg.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Messages between `a` and `b` in either direction, oldest first.
    /// With `since`, only messages created strictly after it.
    pub fn find_conversation(
        &self,
        a: &str,
        b: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let pair = Conversation::new(a, b);
        let since = since.map(|ts| format_timestamp(&ts));

        let rows = self.with_conn(|conn| query_conversation(conn, &pair, since.as_deref()))?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Irreversibly delete every message between `a` and `b`. Returns the count removed.
    pub fn delete_conversation(&self, a: &str, b: &str) -> Result<usize> {
        let pair = Conversation::new(a, b);
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE pair_low = ?1 AND pair_high = ?2",
                (pair.low(), pair.high()),
            )?;
            Ok(deleted)
        })
    }

    pub fn last_message_at(&self, a: &str, b: &str) -> Result<Option<DateTime<Utc>>> {
        let pair = Conversation::new(a, b);
        let raw: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT MAX(created_at) FROM messages WHERE pair_low = ?1 AND pair_high = ?2",
                (pair.low(), pair.high()),
                |row| row.get(0),
            )
            .map_err(Into::into)
        })?;

        raw.as_deref().map(parse_timestamp).transpose()
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        color: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn query_conversation(
    conn: &Connection,
    pair: &Conversation,
    since: Option<&str>,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, receiver_id, content, sender_name, created_at
         FROM messages
         WHERE pair_low = ?1 AND pair_high = ?2
           AND (?3 IS NULL OR created_at > ?3)
         ORDER BY created_at ASC, seq ASC",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![pair.low(), pair.high(), since], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                content: row.get(3)?,
                sender_name: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
