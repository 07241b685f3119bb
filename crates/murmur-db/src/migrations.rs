use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- created_at / read_at are unix microseconds
        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            sender      TEXT NOT NULL,
            recipient   TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            is_read     INTEGER NOT NULL DEFAULT 0,
            read_at     INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender, recipient, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(recipient, is_read);

        -- MAX(created_at) on every append
        CREATE INDEX IF NOT EXISTS idx_messages_created_at
            ON messages(created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
