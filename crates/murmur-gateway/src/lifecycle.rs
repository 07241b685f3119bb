use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use murmur_types::events::{ClientCommand, ServerEvent};
use murmur_types::models::{MessagePage, RosterEntry};

use crate::auth::Authenticator;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::history::HistoryService;
use crate::presence::PresenceBroadcaster;
use crate::registry::{SessionHandle, SessionRegistry};
use crate::router::DeliveryRouter;
use crate::store::{AccountDirectory, MessageStore};
use crate::typing::TypingRelay;
use crate::unread::UnreadAggregator;

/// Where a [`Connection`] is in its life. The earlier steps have no value of
/// their own: a socket is connecting until [`Gateway::authenticate`] returns a
/// username, and authenticated until [`Gateway::connect`] hands back the
/// `Connection`, which starts out `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Closed,
}

/// Owns the registry and every service built on it. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    registry: Arc<SessionRegistry>,
    presence: PresenceBroadcaster,
    unread: Arc<UnreadAggregator>,
    router: DeliveryRouter,
    typing: TypingRelay,
    history: HistoryService,
    authenticator: Arc<dyn Authenticator>,
    config: GatewayConfig,
}

/// What a freshly activated connection must write, in this order: the
/// snapshot first, then whatever is queued on `events`.
pub struct Outbound {
    pub snapshot: Vec<ServerEvent>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn AccountDirectory>,
        authenticator: Arc<dyn Authenticator>,
        config: GatewayConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let unread = Arc::new(UnreadAggregator::new(store.clone(), registry.clone()));

        Self {
            inner: Arc::new(GatewayInner {
                presence: PresenceBroadcaster::new(registry.clone(), directory.clone()),
                router: DeliveryRouter::new(
                    store.clone(),
                    directory,
                    registry.clone(),
                    unread.clone(),
                    config.max_message_len,
                ),
                typing: TypingRelay::new(registry.clone()),
                history: HistoryService::new(store, config.clone()),
                registry,
                unread,
                authenticator,
                config,
            }),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub async fn roster(&self) -> Result<Vec<RosterEntry>, GatewayError> {
        self.inner.presence.roster().await
    }

    /// Re-send the roster to everyone, e.g. after an account was created.
    pub async fn refresh_roster(&self) {
        self.inner.presence.broadcast_roster().await;
    }

    pub async fn history_page(
        &self,
        username: &str,
        with: &str,
        before: Option<i64>,
        limit: Option<u32>,
    ) -> Result<MessagePage, GatewayError> {
        self.inner.history.page(username, with, before, limit).await
    }

    /// Connecting -> Authenticated. Resolves the handshake token to a username.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<String, GatewayError> {
        let token = match token.map(str::trim) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return Err(GatewayError::Authentication("missing token".into())),
        };

        let authenticator = self.inner.authenticator.clone();
        let result = tokio::task::spawn_blocking(move || authenticator.verify(&token))
            .await
            .map_err(|e| GatewayError::Authentication(format!("verification task failed: {e}")))?;

        if let Err(e) = &result {
            warn!("Refused gateway handshake: {}", e);
        }
        result
    }

    /// Authenticated -> Active. Registers the session, announces it to
    /// everyone and prepares the snapshot the new client sees first.
    pub async fn connect(&self, username: String) -> (Connection, Outbound) {
        let (handle, events) = SessionHandle::channel();

        if let Some(previous) = self.inner.registry.register(&username, handle.clone()).await {
            info!(
                "{} reconnected, connection {} superseded by {}",
                username, previous.conn_id, handle.conn_id
            );
        }
        info!("{} ({}) connected to gateway", username, handle.conn_id);

        self.inner.presence.announce_connected(&username).await;

        let snapshot = self.snapshot(&username).await;

        let connection = Connection {
            gateway: self.clone(),
            username,
            handle,
            closed: AtomicBool::new(false),
        };
        (connection, Outbound { snapshot, events })
    }

    async fn snapshot(&self, username: &str) -> Vec<ServerEvent> {
        let mut snapshot = Vec::with_capacity(3);

        match self.inner.presence.roster().await {
            Ok(roster) => snapshot.push(ServerEvent::Users(roster)),
            // The connect broadcast already carried a roster
            Err(e) => warn!("Roster snapshot for {} failed: {}", username, e),
        }

        match self.inner.history.snapshot(username).await {
            Ok(messages) => snapshot.push(ServerEvent::MessageHistory(messages)),
            Err(e) => {
                warn!("History snapshot for {} failed: {}", username, e);
                snapshot.push(ServerEvent::MessageError {
                    error: e.client_message(),
                });
            }
        }

        match self.inner.unread.counts_for(username).await {
            Ok(counts) => snapshot.push(ServerEvent::UnreadMessages(counts)),
            Err(e) => {
                warn!("Unread snapshot for {} failed: {}", username, e);
                snapshot.push(ServerEvent::MessageError {
                    error: e.client_message(),
                });
            }
        }

        snapshot
    }
}

/// One active client connection.
pub struct Connection {
    gateway: Gateway,
    username: String,
    handle: SessionHandle,
    closed: AtomicBool,
}

impl Connection {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn conn_id(&self) -> Uuid {
        self.handle.conn_id
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            ConnectionState::Closed
        } else {
            ConnectionState::Active
        }
    }

    /// Parse and handle one raw text frame. Unparseable input is reported
    /// back as a validation error; the connection stays up.
    pub async fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ClientCommand>(text) {
            Ok(cmd) => self.handle(cmd).await,
            Err(e) => {
                warn!(
                    "{} ({}) bad command: {} -- raw: {}",
                    self.username,
                    self.handle.conn_id,
                    e,
                    text.chars().take(200).collect::<String>()
                );
                self.report(GatewayError::Validation(format!("malformed event: {e}")));
            }
        }
    }

    /// Handle one inbound event. Failures go to this connection only.
    pub async fn handle(&self, cmd: ClientCommand) {
        if self.state() == ConnectionState::Closed {
            debug!("{} ignoring command on closed connection", self.username);
            return;
        }

        if let Err(e) = self.dispatch(cmd).await {
            warn!("{} ({}) command failed: {}", self.username, self.handle.conn_id, e);
            self.report(e);
        }
    }

    async fn dispatch(&self, cmd: ClientCommand) -> Result<(), GatewayError> {
        let inner = &self.gateway.inner;
        match cmd {
            ClientCommand::PrivateMessage { content, to } => {
                inner
                    .router
                    .deliver(&self.username, &self.handle, content, to)
                    .await?;
            }

            ClientCommand::TypingStart { to } => {
                inner.typing.relay(&self.username, &to, true).await;
            }

            ClientCommand::TypingStop { to } => {
                inner.typing.relay(&self.username, &to, false).await;
            }

            ClientCommand::LoadMoreMessages { with, before, limit } => {
                let page = inner.history.page(&self.username, &with, before, limit).await?;
                self.handle.send(ServerEvent::MoreMessages(page));
            }

            ClientCommand::MarkMessagesRead { from } => {
                if from.trim().is_empty() {
                    return Err(GatewayError::Validation("sender is required".into()));
                }
                inner.unread.mark_read(&from, &self.username).await?;
                inner
                    .registry
                    .send_to(
                        &from,
                        ServerEvent::MessagesRead {
                            by: self.username.clone(),
                        },
                    )
                    .await;
            }
        }
        Ok(())
    }

    fn report(&self, error: GatewayError) {
        self.handle.send(ServerEvent::MessageError {
            error: error.client_message(),
        });
    }

    /// Active -> Closed. Safe to call more than once and concurrently with
    /// in-flight commands; only the first call does anything.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let inner = &self.gateway.inner;
        if inner.registry.deregister(&self.username, self.handle.conn_id).await {
            inner.presence.announce_disconnected(&self.username).await;
            info!("{} ({}) disconnected from gateway", self.username, self.handle.conn_id);
        } else {
            info!(
                "{} ({}) closed after being superseded, registry untouched",
                self.username, self.handle.conn_id
            );
        }
    }
}
