use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use murmur_types::events::ServerEvent;
use murmur_types::models::RosterEntry;

use crate::error::GatewayError;
use crate::registry::SessionRegistry;
use crate::store::{AccountDirectory, blocking};

/// Announces registry changes. Always sends the full roster; the
/// `user_connected` / `user_disconnected` point events are extra.
#[derive(Clone)]
pub struct PresenceBroadcaster {
    registry: Arc<SessionRegistry>,
    directory: Arc<dyn AccountDirectory>,
}

impl PresenceBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>, directory: Arc<dyn AccountDirectory>) -> Self {
        Self { registry, directory }
    }

    pub async fn announce_connected(&self, username: &str) {
        self.registry
            .broadcast(ServerEvent::UserConnected(username.to_string()))
            .await;
        self.broadcast_roster().await;
    }

    pub async fn announce_disconnected(&self, username: &str) {
        self.registry
            .broadcast(ServerEvent::UserDisconnected(username.to_string()))
            .await;
        self.broadcast_roster().await;
    }

    /// Recompute the roster against the live registry and send it to everyone.
    pub async fn broadcast_roster(&self) {
        let accounts = self.accounts_or_empty().await;
        let sent = self
            .registry
            .broadcast_with(|online| ServerEvent::Users(build_roster(&accounts, online)))
            .await;
        debug!("Roster broadcast to {} connections", sent);
    }

    /// Current roster, for snapshots and the REST surface.
    pub async fn roster(&self) -> Result<Vec<RosterEntry>, GatewayError> {
        let directory = self.directory.clone();
        let accounts = blocking(move || directory.list_usernames()).await?;
        let online = self.registry.online_usernames().await;
        let online: HashSet<&str> = online.iter().map(String::as_str).collect();
        Ok(build_roster(&accounts, &online))
    }

    async fn accounts_or_empty(&self) -> Vec<String> {
        let directory = self.directory.clone();
        blocking(move || directory.list_usernames())
            .await
            .unwrap_or_else(|e| {
                warn!("Account directory unavailable, roster limited to online users: {}", e);
                Vec::new()
            })
    }
}

/// Every account plus every online session, sorted by username.
pub fn build_roster(accounts: &[String], online: &HashSet<&str>) -> Vec<RosterEntry> {
    let names: BTreeSet<&str> = accounts
        .iter()
        .map(String::as_str)
        .chain(online.iter().copied())
        .collect();

    names
        .into_iter()
        .map(|username| RosterEntry {
            username: username.to_string(),
            is_online: online.contains(username),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_marks_online_accounts_and_keeps_offline_ones() {
        let accounts = vec!["carol".to_string(), "alice".to_string(), "bob".to_string()];
        let online: HashSet<&str> = ["bob"].into_iter().collect();

        let roster = build_roster(&accounts, &online);
        let flags: Vec<_> = roster.iter().map(|e| (e.username.as_str(), e.is_online)).collect();
        assert_eq!(flags, [("alice", false), ("bob", true), ("carol", false)]);
    }

    #[test]
    fn online_sessions_unknown_to_the_directory_still_appear() {
        let online: HashSet<&str> = ["dave"].into_iter().collect();
        let roster = build_roster(&[], &online);
        assert_eq!(
            roster,
            vec![RosterEntry {
                username: "dave".into(),
                is_online: true,
            }]
        );
    }
}
