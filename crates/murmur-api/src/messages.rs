use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use murmur_gateway::GatewayError;
use murmur_types::api::{Claims, MessageQuery};

use crate::auth::AppState;

/// GET /conversations/{username}/messages: the caller's conversation with
/// `username`, paged backwards with `before` (a message id) and `limit`.
/// Same page contract as the gateway's `load_more_messages`.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let page = state
        .gateway
        .history_page(&claims.username, &username, query.before, query.limit)
        .await
        .map_err(|e| match e {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            other => {
                error!("Conversation query for {} failed: {}", claims.username, other);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    Ok(Json(page))
}
