use std::sync::Arc;

use tracing::{debug, error, info, warn};

use murmur_types::events::ServerEvent;
use murmur_types::models::ChatMessage;

use crate::error::GatewayError;
use crate::registry::{SessionHandle, SessionRegistry};
use crate::store::{AccountDirectory, MessageStore, blocking};
use crate::unread::UnreadAggregator;

/// Persists private messages and routes them to both ends.
pub struct DeliveryRouter {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn AccountDirectory>,
    registry: Arc<SessionRegistry>,
    unread: Arc<UnreadAggregator>,
    max_message_len: usize,
}

impl DeliveryRouter {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn AccountDirectory>,
        registry: Arc<SessionRegistry>,
        unread: Arc<UnreadAggregator>,
        max_message_len: usize,
    ) -> Self {
        Self {
            store,
            directory,
            registry,
            unread,
            max_message_len,
        }
    }

    /// Validate, persist, echo on `origin`, then forward if the recipient is online.
    ///
    /// Nothing is sent anywhere unless the store accepted the message.
    pub async fn deliver(
        &self,
        sender: &str,
        origin: &SessionHandle,
        content: String,
        to: String,
    ) -> Result<ChatMessage, GatewayError> {
        self.validate(&content, &to).await?;

        let store = self.store.clone();
        let from = sender.to_string();
        let message = blocking(move || store.append(&from, &to, &content))
            .await
            .inspect_err(|e| error!("Failed to persist message from {}: {}", sender, e))?;

        origin.send(ServerEvent::PrivateMessage(message.clone()));

        match self.registry.lookup(&message.recipient).await {
            // A note-to-self already arrived through the echo
            Some(handle) if handle.conn_id == origin.conn_id => {}
            Some(handle) => {
                handle.send(ServerEvent::PrivateMessage(message.clone()));
                if let Err(e) = self.unread.refresh(&message.recipient).await {
                    warn!("Unread refresh for {} failed: {}", message.recipient, e);
                }
                debug!("Message {} delivered {} -> {}", message.id, sender, message.recipient);
            }
            None => {
                info!(
                    "Message {} stored for offline user {}",
                    message.id, message.recipient
                );
            }
        }

        Ok(message)
    }

    async fn validate(&self, content: &str, to: &str) -> Result<(), GatewayError> {
        if content.trim().is_empty() {
            return Err(GatewayError::Validation("message content is required".into()));
        }
        if content.chars().count() > self.max_message_len {
            return Err(GatewayError::Validation(format!(
                "message exceeds {} characters",
                self.max_message_len
            )));
        }
        if to.trim().is_empty() {
            return Err(GatewayError::Validation("recipient is required".into()));
        }

        let directory = self.directory.clone();
        let recipient = to.to_string();
        if !blocking(move || directory.user_exists(&recipient)).await? {
            return Err(GatewayError::Validation(format!("unknown recipient {to}")));
        }
        Ok(())
    }
}
