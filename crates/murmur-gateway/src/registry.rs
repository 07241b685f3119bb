use std::collections::{HashMap, HashSet};

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use murmur_types::events::ServerEvent;

/// Outbound side of one live connection.
///
/// `conn_id` identifies the connection, not the user: a reconnecting user gets
/// a fresh id, which is what lets a late disconnect of the old socket be told
/// apart from the new one.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub conn_id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl SessionHandle {
    /// New handle plus the receiver its connection writer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                conn_id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    /// Queue an event. Returns false once the connection writer is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Online users: username -> the one connection that currently owns it.
///
/// Lock discipline: every mutation takes the write lock; fan-out
/// ([`SessionRegistry::broadcast_with`]) holds the read lock while it queues,
/// so no connection can see broadcasts out of mutation order.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `username` to `handle`, last registration wins. The displaced
    /// handle, if any, is returned untouched; closing it is the caller's call.
    pub async fn register(&self, username: &str, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions
            .write()
            .await
            .insert(username.to_string(), handle)
    }

    /// Remove `username`, but only if `conn_id` still owns it.
    pub async fn deregister(&self, username: &str, conn_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(username) {
            Some(current) if current.conn_id == conn_id => {
                sessions.remove(username);
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, username: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(username).cloned()
    }

    pub async fn online_usernames(&self) -> HashSet<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Send a targeted event to a specific user. Returns whether they were online.
    pub async fn send_to(&self, username: &str, event: ServerEvent) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(username) {
            Some(handle) => handle.send(event),
            None => false,
        }
    }

    /// Build one event from the current online set and queue it on every
    /// connection, all under a single read lock. Returns the recipient count.
    pub async fn broadcast_with<F>(&self, build: F) -> usize
    where
        F: FnOnce(&HashSet<&str>) -> ServerEvent,
    {
        let sessions = self.sessions.read().await;
        let online: HashSet<&str> = sessions.keys().map(String::as_str).collect();
        let event = build(&online);

        sessions
            .values()
            .filter(|handle| handle.send(event.clone()))
            .count()
    }

    /// Broadcast an event to all connected clients.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        self.broadcast_with(|_| event).await
    }
}
