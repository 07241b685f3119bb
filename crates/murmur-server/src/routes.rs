use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use murmur_api::AppState;
use murmur_api::middleware::{bearer_token, require_auth};
use murmur_api::{auth, messages, users};
use murmur_gateway::connection;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/conversations/{username}/messages", get(messages::get_conversation))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// The token rides on the upgrade request (`?token=` or a Bearer header);
/// a bad one is refused before the socket is ever opened.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = query.token.as_deref().or_else(|| bearer_token(&headers));

    match state.gateway.authenticate(token).await {
        Ok(username) => {
            let gateway = state.gateway.clone();
            ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway, username))
        }
        Err(_) => StatusCode::UNAUTHORIZED.into_response(),
    }
}
