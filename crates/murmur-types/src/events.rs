use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, MessagePage, RosterEntry};

/// Events sent over the WebSocket gateway, server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full roster, every account with its online flag
    Users(Vec<RosterEntry>),

    /// Connect-time history snapshot, oldest first
    MessageHistory(Vec<ChatMessage>),

    /// Reply to `load_more_messages`
    MoreMessages(MessagePage),

    /// A message was persisted; sent to the sender (echo) and the recipient
    PrivateMessage(ChatMessage),

    /// Unread counts for the receiving user, keyed by sender
    UnreadMessages(BTreeMap<String, u64>),

    TypingStart { sender: String },

    TypingStop { sender: String },

    /// The named user has read everything you sent them
    MessagesRead { by: String },

    UserConnected(String),

    UserDisconnected(String),

    /// An inbound event was rejected or could not be completed
    MessageError { error: String },
}

impl ServerEvent {
    /// Wire name of the event, as it appears in the `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Users(_) => "users",
            Self::MessageHistory(_) => "message_history",
            Self::MoreMessages(_) => "more_messages",
            Self::PrivateMessage(_) => "private_message",
            Self::UnreadMessages(_) => "unread_messages",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::MessagesRead { .. } => "messages_read",
            Self::UserConnected(_) => "user_connected",
            Self::UserDisconnected(_) => "user_disconnected",
            Self::MessageError { .. } => "message_error",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Missing fields deserialize as empty so they surface as validation
    /// errors rather than parse errors.
    PrivateMessage {
        #[serde(default)]
        content: String,
        #[serde(default)]
        to: String,
    },

    TypingStart { to: String },

    TypingStop { to: String },

    /// Page backwards through the conversation with `with`.
    /// `before` is a message id; `limit` defaults server-side.
    LoadMoreMessages {
        with: String,
        #[serde(default)]
        before: Option<i64>,
        #[serde(default)]
        limit: Option<u32>,
    },

    /// Mark every message from `from` to the caller as read
    MarkMessagesRead { from: String },
}
