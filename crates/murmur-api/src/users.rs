use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use murmur_types::api::Claims;

use crate::auth::AppState;

/// GET /users: every account with its online flag.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let roster = state.gateway.roster().await.map_err(|e| {
        error!("Roster query failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(roster))
}
