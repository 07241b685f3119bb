use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use murmur_types::events::ServerEvent;

use crate::error::GatewayError;
use crate::registry::SessionRegistry;
use crate::store::{MessageStore, blocking};

/// Per-sender unread counts, recomputed from the store on every change.
///
/// Work for one recipient (mark-read, recount, push) runs under that
/// recipient's lock so pushes leave in the order the store changed.
/// Different recipients proceed in parallel.
pub struct UnreadAggregator {
    store: Arc<dyn MessageStore>,
    registry: Arc<SessionRegistry>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UnreadAggregator {
    pub fn new(store: Arc<dyn MessageStore>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            store,
            registry,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn counts_for(&self, recipient: &str) -> Result<BTreeMap<String, u64>, GatewayError> {
        let lock = self.lock_for(recipient);
        let _guard = lock.lock().await;
        self.recount(recipient).await
    }

    /// Recompute and push to the recipient's connection, if they have one.
    pub async fn refresh(&self, recipient: &str) -> Result<(), GatewayError> {
        let lock = self.lock_for(recipient);
        let _guard = lock.lock().await;

        let counts = self.recount(recipient).await?;
        self.registry
            .send_to(recipient, ServerEvent::UnreadMessages(counts))
            .await;
        Ok(())
    }

    /// Mark `sender` -> `recipient` read, then recount and push to `recipient`.
    pub async fn mark_read(&self, sender: &str, recipient: &str) -> Result<usize, GatewayError> {
        let lock = self.lock_for(recipient);
        let _guard = lock.lock().await;

        let store = self.store.clone();
        let (from, to) = (sender.to_string(), recipient.to_string());
        let updated = blocking(move || store.mark_read(&from, &to)).await?;
        debug!("{} marked {} messages from {} read", recipient, updated, sender);

        let counts = self.recount(recipient).await?;
        self.registry
            .send_to(recipient, ServerEvent::UnreadMessages(counts))
            .await;
        Ok(updated)
    }

    async fn recount(&self, recipient: &str) -> Result<BTreeMap<String, u64>, GatewayError> {
        let store = self.store.clone();
        let recipient = recipient.to_string();
        blocking(move || store.unread_counts(&recipient)).await
    }

    fn lock_for(&self, recipient: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(recipient.to_string()).or_default().clone()
    }
}
