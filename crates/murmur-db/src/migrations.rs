use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            first_name  TEXT NOT NULL,
            last_name   TEXT NOT NULL,
            color       TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS contacts (
            owner_id    TEXT NOT NULL REFERENCES users(id),
            contact_id  TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (owner_id, contact_id)
        );

        -- sender/receiver are opaque ids; the ledger trusts upstream identity
        -- and does not reference users(id).
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            sender_id       TEXT NOT NULL,
            receiver_id     TEXT NOT NULL,
            pair_low        TEXT NOT NULL,
            pair_high       TEXT NOT NULL,
            content         TEXT NOT NULL,
            sender_name     TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(pair_low, pair_high, created_at, seq);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
