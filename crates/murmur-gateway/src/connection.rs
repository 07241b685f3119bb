use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use murmur_types::events::ServerEvent;

use crate::lifecycle::{Connection, Gateway};

/// Drive one WebSocket whose upgrade request already authenticated as `username`.
///
/// The writer task sends the connect snapshot, then drains the session queue
/// and pings every heartbeat interval; two missed Pongs end the connection.
/// The reader feeds text frames to the connection one at a time, so a
/// client's events are handled in the order it sent them.
///
/// When the writer stops first the reader is told to stop rather than
/// aborted: a command already being handled runs to completion, so the
/// other party still gets its forward, unread push or read receipt.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway, username: String) {
    let (mut sender, receiver) = socket.split();
    let heartbeat_interval = gateway.config().heartbeat_interval;

    let (connection, outbound) = gateway.connect(username).await;
    let connection = Arc::new(connection);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        for event in outbound.snapshot {
            if send_event(&mut sender, &event).await.is_err() {
                return;
            }
        }

        let mut events = outbound.events;
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = events.recv() => {
                    let Some(event) = result else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = sender.send(Message::Close(None)).await;
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let recv_connection = connection.clone();
    let mut recv_task = tokio::spawn(async move {
        read_frames(receiver, &recv_connection, &pong_flag_recv, shutdown_rx).await;
    });

    // Wait for either task to finish
    let writer_done = tokio::select! {
        _ = &mut send_task => true,
        _ = &mut recv_task => false,
    };

    if writer_done {
        let _ = shutdown_tx.send(true);
        if let Err(e) = recv_task.await {
            error!("Gateway reader task failed: {}", e);
        }
    } else {
        send_task.abort();
    }

    connection.close().await;
}

/// Reader loop. Shutdown is only checked between frames, never while a
/// command is being handled.
pub(crate) async fn read_frames<S>(
    mut receiver: S,
    connection: &Connection,
    pong_received: &AtomicBool,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("{} reader stopping, writer is gone", connection.username());
                break;
            }
            frame = receiver.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => connection.handle_text(text.as_str()).await,
            Some(Ok(Message::Pong(_))) => pong_received.store(true, Ordering::Release),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => {}
        }
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode {} event: {}", event.name(), e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}
