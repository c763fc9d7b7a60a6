use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use super::require_field;
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_field("user_id", &user_id)?;

    let documents = state
        .documents
        .documents_for_user(&user_id)
        .await
        .map_err(|err| ApiError::upstream("Failed to retrieve documents", err))?;

    let payload: Vec<Value> = documents
        .into_iter()
        .map(|doc| {
            json!({
                "filename": doc.filename,
                "upload_time": doc.upload_time,
                "text_length": doc.content.chars().count(),
            })
        })
        .collect();

    Ok(Json(json!({ "user_id": user_id, "documents": payload })))
}
