//! Database row types. These map directly to SQLite rows.
//! Distinct from murmur-types models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use murmur_types::models::ChatMessage;
use tracing::warn;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub created_at: i64,
    pub is_read: bool,
    pub read_at: Option<i64>,
}

impl MessageRow {
    pub fn into_message(self) -> ChatMessage {
        let timestamp = micros_to_datetime(self.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on message {}", self.created_at, self.id);
            DateTime::default()
        });

        ChatMessage {
            id: self.id,
            content: self.content,
            sender: self.sender,
            recipient: self.recipient,
            timestamp,
            is_read: self.is_read,
            read_at: self.read_at.and_then(micros_to_datetime),
        }
    }
}

pub fn micros_to_datetime(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}
