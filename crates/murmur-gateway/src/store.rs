//! Persistence seams consumed by the gateway, and their SQLite implementations.
//!
//! The traits are synchronous; the gateway always calls them through
//! [`blocking`] so a slow store never stalls the async workers.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use murmur_db::Database;
use murmur_types::models::ChatMessage;

use crate::error::GatewayError;

/// Durable message history.
pub trait MessageStore: Send + Sync + 'static {
    /// Persist a new unread message; the store assigns `id` and `timestamp`.
    fn append(&self, sender: &str, recipient: &str, content: &str) -> Result<ChatMessage>;

    fn find_message(&self, id: i64) -> Result<Option<ChatMessage>>;

    /// Newest `limit` messages between `a` and `b` older than `before`, oldest first.
    fn find_conversation(
        &self,
        a: &str,
        b: &str,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ChatMessage>>;

    /// Newest `limit` messages involving `username`, oldest first.
    fn recent_for_user(&self, username: &str, limit: u32) -> Result<Vec<ChatMessage>>;

    /// Mark all unread messages from `sender` to `recipient` read. Returns the count updated.
    fn mark_read(&self, sender: &str, recipient: &str) -> Result<usize>;

    fn unread_counts(&self, recipient: &str) -> Result<BTreeMap<String, u64>>;
}

/// Every registered account, online or not.
pub trait AccountDirectory: Send + Sync + 'static {
    fn list_usernames(&self) -> Result<Vec<String>>;

    fn user_exists(&self, username: &str) -> Result<bool>;
}

impl MessageStore for Database {
    fn append(&self, sender: &str, recipient: &str, content: &str) -> Result<ChatMessage> {
        Ok(self.insert_message(sender, recipient, content)?.into_message())
    }

    fn find_message(&self, id: i64) -> Result<Option<ChatMessage>> {
        Ok(self.get_message(id)?.map(|row| row.into_message()))
    }

    fn find_conversation(
        &self,
        a: &str,
        b: &str,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ChatMessage>> {
        let before = before.map(|ts| ts.timestamp_micros());
        let rows = self.get_conversation(a, b, before, limit)?;
        Ok(rows.into_iter().map(|row| row.into_message()).collect())
    }

    fn recent_for_user(&self, username: &str, limit: u32) -> Result<Vec<ChatMessage>> {
        let rows = self.get_recent_for_user(username, limit)?;
        Ok(rows.into_iter().map(|row| row.into_message()).collect())
    }

    fn mark_read(&self, sender: &str, recipient: &str) -> Result<usize> {
        Database::mark_read(self, sender, recipient)
    }

    fn unread_counts(&self, recipient: &str) -> Result<BTreeMap<String, u64>> {
        Ok(Database::unread_counts(self, recipient)?.into_iter().collect())
    }
}

impl AccountDirectory for Database {
    fn list_usernames(&self) -> Result<Vec<String>> {
        Database::list_usernames(self)
    }

    fn user_exists(&self, username: &str) -> Result<bool> {
        Ok(self.get_user_by_username(username)?.is_some())
    }
}

/// Run blocking store work off the async runtime, folding both the join
/// error and the store error into [`GatewayError::Persistence`].
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, GatewayError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GatewayError::Persistence(format!("store task failed: {e}")))?
        .map_err(GatewayError::store)
}
