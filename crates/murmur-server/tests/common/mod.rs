#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tokio::net::TcpListener;
use tower::ServiceExt;

use murmur_api::AppStateInner;
use murmur_db::Database;
use murmur_gateway::auth::JwtAuthenticator;
use murmur_gateway::{Gateway, GatewayConfig};
use murmur_server::routes::build_router;

pub const SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub app: Router,
    pub db: Arc<Database>,
}

pub fn test_app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
    let authenticator = Arc::new(JwtAuthenticator::new(SECRET, db.clone()));
    let gateway = Gateway::new(db.clone(), db.clone(), authenticator, GatewayConfig::default());

    let state = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: SECRET.to_string(),
        token_ttl_days: 1,
        gateway,
    });

    TestApp {
        app: build_router(state),
        db,
    }
}

/// Serve the router on an ephemeral port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

/// Register `username` and return its token.
pub async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/auth/register",
        None,
        Some(serde_json::json!({ "username": username, "password": "correct-horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");
    body["token"].as_str().unwrap().to_string()
}
