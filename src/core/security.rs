use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub const CLIENT_SECRET_HEADER: &str = "x-client-secret";

#[derive(Clone)]
pub struct ClientSecret {
    value: String,
}

impl ClientSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        candidate.as_bytes().ct_eq(self.value.as_bytes()).into()
    }
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClientSecret(****)")
    }
}

pub fn require_client_secret(headers: &HeaderMap, expected: &ClientSecret) -> Result<(), ApiError> {
    tracing::debug!("Verifying client secret key");
    let header_value = headers
        .get(CLIENT_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if header_value.is_empty() || !expected.matches(header_value) {
        tracing::warn!("Invalid client secret key provided");
        return Err(ApiError::Unauthorized);
    }

    tracing::debug!("Client secret key verified successfully");
    Ok(())
}

/// Middleware guarding every protected route with the shared client secret.
pub async fn client_secret_layer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_client_secret(request.headers(), &state.client_secret)?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn require_client_secret_accepts_valid_header() {
        let expected = ClientSecret::new("secret");
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_SECRET_HEADER, HeaderValue::from_static("secret"));

        let result = require_client_secret(&headers, &expected);

        assert!(result.is_ok());
    }

    #[test]
    fn require_client_secret_rejects_missing_or_invalid_header() {
        let expected = ClientSecret::new("secret");
        let headers = HeaderMap::new();

        let missing = require_client_secret(&headers, &expected);
        assert!(matches!(missing, Err(ApiError::Unauthorized)));

        let mut invalid_headers = HeaderMap::new();
        invalid_headers.insert(CLIENT_SECRET_HEADER, HeaderValue::from_static("wrong"));
        let invalid = require_client_secret(&invalid_headers, &expected);
        assert!(matches!(invalid, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn require_client_secret_rejects_prefix_of_secret() {
        let expected = ClientSecret::new("secret");
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_SECRET_HEADER, HeaderValue::from_static("secre"));

        let result = require_client_secret(&headers, &expected);

        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn require_client_secret_rejects_non_utf8_header_value() {
        let expected = ClientSecret::new("secret");
        let mut headers = HeaderMap::new();
        let non_utf8 = HeaderValue::from_bytes(&[0xFF, 0xFE, 0xFD])
            .expect("header value bytes should be accepted");
        headers.insert(CLIENT_SECRET_HEADER, non_utf8);

        let result = require_client_secret(&headers, &expected);

        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn debug_output_does_not_leak_secret() {
        let secret = ClientSecret::new("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
    }
}
