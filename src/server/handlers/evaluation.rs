use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::require_field;
use crate::core::errors::ApiError;
use crate::state::AppState;

fn default_include_metadata() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct EvaluationRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
}

#[derive(Debug, Deserialize)]
pub struct BatchEvaluationRequest {
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub filepath: Option<String>,
}

/// An empty body exports to the default file; anything else must be valid JSON.
fn parse_export_request(body: &[u8]) -> Result<ExportRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ExportRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid export request: {}", e)))
}

pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EvaluationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_field("query", &payload.query)?;
    require_field("session_id", &payload.session_id)?;
    require_field("user_id", &payload.user_id)?;

    let result = state
        .evaluation
        .evaluate_query(
            &payload.query,
            &payload.session_id,
            &payload.user_id,
            payload.include_metadata,
        )
        .await?;
    Ok(Json(result))
}

pub async fn evaluate_batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchEvaluationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.queries.iter().all(|q| q.trim().is_empty()) {
        return Err(ApiError::BadRequest("queries is required".to_string()));
    }
    require_field("session_id", &payload.session_id)?;
    require_field("user_id", &payload.user_id)?;

    let queries: Vec<String> = payload
        .queries
        .into_iter()
        .filter(|q| !q.trim().is_empty())
        .collect();
    let results = state
        .evaluation
        .evaluate_batch(
            &queries,
            &payload.session_id,
            &payload.user_id,
            payload.include_metadata,
        )
        .await;
    Ok(Json(results))
}

pub async fn report(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.evaluation.report().await)
}

pub async fn export(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = parse_export_request(&body)?;
    let outcome = state.evaluation.export(request.filepath.as_deref()).await?;
    let filepath = outcome.filepath.display().to_string();

    Ok(Json(json!({
        "message": format!("Results exported to {}", filepath),
        "filepath": filepath,
        "count": outcome.count,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_export_body_uses_the_default_file() {
        assert_eq!(parse_export_request(b"").unwrap().filepath, None);
        assert_eq!(parse_export_request(b" \n").unwrap().filepath, None);
        assert_eq!(
            parse_export_request(br#"{"filepath": "runs/a.json"}"#)
                .unwrap()
                .filepath
                .as_deref(),
            Some("runs/a.json")
        );
    }

    #[test]
    fn malformed_export_body_is_rejected() {
        let bodies: [&[u8]; 3] = [br#"{"filepath": 5}"#, b"{not json", br#""runs/a.json""#];
        for body in bodies {
            assert!(matches!(
                parse_export_request(body),
                Err(ApiError::BadRequest(_))
            ));
        }
    }
}
