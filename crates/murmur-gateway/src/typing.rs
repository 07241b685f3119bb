use std::sync::Arc;

use tracing::trace;

use murmur_types::events::ServerEvent;

use crate::registry::SessionRegistry;

/// Forwards "is typing" signals. Nothing is stored or acknowledged and an
/// offline recipient simply never hears about it.
#[derive(Clone)]
pub struct TypingRelay {
    registry: Arc<SessionRegistry>,
}

impl TypingRelay {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Returns whether the signal was forwarded.
    pub async fn relay(&self, sender: &str, to: &str, started: bool) -> bool {
        let sender = sender.to_string();
        let event = if started {
            ServerEvent::TypingStart { sender }
        } else {
            ServerEvent::TypingStop { sender }
        };

        let delivered = self.registry.send_to(to, event).await;
        trace!("typing started={} -> {} (delivered={})", started, to, delivered);
        delivered
    }
}
