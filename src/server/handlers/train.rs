use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;

use super::require_field;
use crate::core::errors::ApiError;
use crate::pipeline::Upload;
use crate::state::AppState;

/// `multipart/form-data` with a `user_id` text field and a `file` part.
pub async fn train(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut user_id = String::new();
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("Invalid multipart body: {}", err)))?
    {
        match field.name() {
            Some("user_id") => {
                user_id = field
                    .text()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("Invalid user_id field: {}", err)))?;
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let read_start = Instant::now();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("Failed to read file: {}", err)))?;
                upload = Some(Upload {
                    filename,
                    bytes: bytes.to_vec(),
                    read_time: read_start.elapsed(),
                });
            }
            _ => {}
        }
    }

    require_field("user_id", &user_id)?;
    let upload = upload.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;
    tracing::info!(
        user_id = %user_id,
        file = %upload.filename,
        size = upload.bytes.len(),
        "Starting training"
    );

    let result = state.train.train(&user_id, upload).await?;
    Ok(Json(result))
}
