use std::sync::Arc;

use tracing::debug;

use murmur_types::models::{ChatMessage, MessagePage};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::store::{MessageStore, blocking};

/// Read side of the message store: connect-time snapshots and backwards paging.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn MessageStore>,
    config: GatewayConfig,
}

impl HistoryService {
    pub fn new(store: Arc<dyn MessageStore>, config: GatewayConfig) -> Self {
        Self { store, config }
    }

    /// Most recent messages sent or received by `username`, oldest first.
    pub async fn snapshot(&self, username: &str) -> Result<Vec<ChatMessage>, GatewayError> {
        let store = self.store.clone();
        let username = username.to_string();
        let limit = self.config.history_limit;
        blocking(move || store.recent_for_user(&username, limit)).await
    }

    /// One page of the conversation between `username` and `with`.
    ///
    /// `before` is a message id. An id the store does not know is treated as
    /// no cursor at all, returning the newest page. `has_more` is true when
    /// the page came back full.
    pub async fn page(
        &self,
        username: &str,
        with: &str,
        before: Option<i64>,
        limit: Option<u32>,
    ) -> Result<MessagePage, GatewayError> {
        if with.trim().is_empty() {
            return Err(GatewayError::Validation("conversation partner is required".into()));
        }
        let limit = self.config.page_size(limit);

        let cutoff = match before {
            Some(id) => match self.resolve_cursor(id).await {
                Ok(message) => Some(message.timestamp),
                Err(GatewayError::Lookup(reason)) => {
                    debug!("{}, paging from the newest message", reason);
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let store = self.store.clone();
        let (a, b) = (username.to_string(), with.to_string());
        let messages = blocking(move || store.find_conversation(&a, &b, cutoff, limit)).await?;

        Ok(MessagePage {
            has_more: messages.len() == limit as usize,
            messages,
        })
    }

    async fn resolve_cursor(&self, id: i64) -> Result<ChatMessage, GatewayError> {
        let store = self.store.clone();
        blocking(move || store.find_message(id))
            .await?
            .ok_or_else(|| GatewayError::Lookup(format!("message {id}")))
    }
}
