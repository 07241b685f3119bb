//! WebSocket gateway over a real socket: handshake auth, connect snapshot
//! and message delivery.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use common::{register, serve, test_app};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Next JSON event, skipping control frames.
async fn next_event(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Read events until one of type `kind` arrives.
async fn expect_event(socket: &mut Socket, kind: &str) -> Value {
    loop {
        let event = next_event(socket).await;
        if event["type"] == kind {
            return event["data"].clone();
        }
    }
}

#[tokio::test]
async fn upgrade_without_valid_token_is_refused() {
    let t = test_app();
    let addr = serve(t.app).await;

    for url in [
        format!("ws://{addr}/gateway"),
        format!("ws://{addr}/gateway?token=garbage"),
    ] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
            other => panic!("expected 401, got {:?}", other.map(|(_, r)| r.status())),
        }
    }
}

#[tokio::test]
async fn connect_snapshot_arrives_in_order() {
    let t = test_app();
    let alice = register(&t.app, "alice").await;
    register(&t.app, "bob").await;
    t.db.insert_message("bob", "alice", "while you were out").unwrap();
    let addr = serve(t.app).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/gateway?token={alice}"))
        .await
        .unwrap();

    // The snapshot is written before anything queued during connect
    let users = next_event(&mut socket).await;
    assert_eq!(users["type"], "users");
    assert_eq!(
        users["data"],
        json!([
            { "username": "alice", "isOnline": true },
            { "username": "bob", "isOnline": false },
        ])
    );

    let event = next_event(&mut socket).await;
    assert_eq!(event["type"], "message_history");
    assert_eq!(event["data"][0]["content"], "while you were out");

    let unread = next_event(&mut socket).await;
    assert_eq!(unread["type"], "unread_messages");
    assert_eq!(unread["data"], json!({ "bob": 1 }));
}

#[tokio::test]
async fn private_message_is_echoed_and_forwarded() {
    let t = test_app();
    let alice = register(&t.app, "alice").await;
    let bob = register(&t.app, "bob").await;
    let addr = serve(t.app).await;

    let (mut a, _) = connect_async(format!("ws://{addr}/gateway?token={alice}"))
        .await
        .unwrap();
    expect_event(&mut a, "unread_messages").await;

    let (mut b, _) = connect_async(format!("ws://{addr}/gateway?token={bob}"))
        .await
        .unwrap();
    expect_event(&mut b, "unread_messages").await;

    let command = json!({ "type": "private_message", "data": { "content": "hi bob", "to": "bob" } });
    a.send(Message::Text(command.to_string().into())).await.unwrap();

    let echo = expect_event(&mut a, "private_message").await;
    assert_eq!(echo["sender"], "alice");
    assert_eq!(echo["recipient"], "bob");
    assert_eq!(echo["isRead"], false);

    let delivered = expect_event(&mut b, "private_message").await;
    assert_eq!(delivered["id"], echo["id"]);
    assert_eq!(delivered["content"], "hi bob");

    let unread = expect_event(&mut b, "unread_messages").await;
    assert_eq!(unread, json!({ "alice": 1 }));

    let read = json!({ "type": "mark_messages_read", "data": { "from": "alice" } });
    b.send(Message::Text(read.to_string().into())).await.unwrap();

    assert_eq!(expect_event(&mut b, "unread_messages").await, json!({}));
    assert_eq!(
        expect_event(&mut a, "messages_read").await,
        json!({ "by": "bob" })
    );
}

#[tokio::test]
async fn malformed_frames_report_an_error_and_keep_the_socket() {
    let t = test_app();
    let alice = register(&t.app, "alice").await;
    let addr = serve(t.app).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/gateway?token={alice}"))
        .await
        .unwrap();
    expect_event(&mut socket, "unread_messages").await;

    socket
        .send(Message::Text("{not json".to_string().into()))
        .await
        .unwrap();
    let error = expect_event(&mut socket, "message_error").await;
    assert!(error["error"].as_str().unwrap().contains("malformed"));

    let command = json!({ "type": "private_message", "data": { "content": "note", "to": "alice" } });
    socket.send(Message::Text(command.to_string().into())).await.unwrap();
    let echo = expect_event(&mut socket, "private_message").await;
    assert_eq!(echo["content"], "note");
}
