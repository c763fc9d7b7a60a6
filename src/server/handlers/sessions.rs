use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::require_field;
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub user_id: String,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_field("user_id", &payload.user_id)?;
    tracing::info!(user_id = %payload.user_id, "Creating session");

    let session = state
        .documents
        .create_session(&payload.user_id)
        .await
        .map_err(|err| ApiError::upstream("Failed to create session", err))?;

    tracing::info!(session_id = %session.session_id, user_id = %session.user_id, "Session created");
    Ok(Json(session))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_field("session_id", &session_id)?;

    let deleted = state
        .documents
        .delete_session(&session_id)
        .await
        .map_err(|err| ApiError::upstream("Failed to delete session", err))?;

    tracing::info!(session_id = %session_id, turns = deleted, "Session deleted");
    Ok(Json(json!({ "session_id": session_id, "deleted": deleted })))
}
