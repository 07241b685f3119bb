use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted private message.
///
/// Everything except `is_read` / `read_at` is fixed once the store has
/// assigned `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub content: String,
    pub sender: String,
    pub recipient: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

/// One line of the presence roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub username: String,
    pub is_online: bool,
}

/// A page of conversation history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    /// `true` whenever the page came back full. May be a false positive when
    /// exactly `limit` older messages remained.
    pub has_more: bool,
}
