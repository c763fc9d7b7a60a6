use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use super::require_field;
use crate::core::errors::ApiError;
use crate::pipeline::format_secs;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PredictRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_field("query", &payload.query)?;
    require_field("session_id", &payload.session_id)?;
    require_field("user_id", &payload.user_id)?;

    let started = Instant::now();
    let result = state
        .predict
        .predict(&payload.query, &payload.session_id, &payload.user_id)
        .await?;

    tracing::info!(
        user_id = %payload.user_id,
        session_id = %payload.session_id,
        elapsed = %format_secs(started.elapsed()),
        "Prediction completed"
    );
    Ok(Json(result))
}
