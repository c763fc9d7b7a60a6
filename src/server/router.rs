use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::core::security::{client_secret_layer, CLIENT_SECRET_HEADER};
use crate::server::handlers::{documents, evaluation, health, predict, sessions, train};
use crate::state::AppState;

/// Builds the application router.
///
/// Every route except `GET /health` sits behind the client-secret
/// middleware. Uploads are capped at `server.max_upload_bytes`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_allowed_origins);
    let max_upload = state.config.server.max_upload_bytes;

    let protected = Router::new()
        .route("/create-session", post(sessions::create_session))
        .route("/sessions/:session_id", delete(sessions::delete_session))
        .route("/train", post(train::train))
        .route("/predict", post(predict::predict))
        .route("/documents/:user_id", get(documents::list_documents))
        .route("/evaluation/evaluate", post(evaluation::evaluate))
        .route("/evaluation/evaluate-batch", post(evaluation::evaluate_batch))
        .route("/evaluation/report", get(evaluation::report))
        .route("/evaluation/export", post(evaluation::export))
        .route_layer(from_fn_with_state(state.clone(), client_secret_layer));

    let app = Router::new()
        .route("/health", get(health::health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(max_upload))
        .with_state(state)
        .layer(cors_layer);
    with_request_tracing(app)
}

/// Request and response events at INFO so they reach `api_requests.log`.
fn with_request_tracing(app: Router) -> Router {
    app.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

fn build_cors_layer(configured: &[String]) -> CorsLayer {
    let origins = resolve_allowed_origins(configured)
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static(CLIENT_SECRET_HEADER),
        ])
}

fn resolve_allowed_origins(configured: &[String]) -> Vec<String> {
    let origins: Vec<String> = configured
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        return default_local_origins();
    }
    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::io::Write;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLog {
        type Writer = CapturedLog;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn requests_are_logged_at_info() {
        let log = CapturedLog::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_ansi(false)
            .with_writer(log.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = with_request_tracing(Router::new().route("/ping", get(|| async { "pong" })));
        let response = app
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_success());
        let output = log.contents();
        assert!(output.contains("started processing request"), "{}", output);
        assert!(output.contains("finished processing request"), "{}", output);
        assert!(output.contains("/ping"), "{}", output);
    }

    #[test]
    fn configured_origins_replace_defaults() {
        let origins = resolve_allowed_origins(&[" https://support.example.com ".to_string(), "".to_string()]);

        assert_eq!(origins, vec!["https://support.example.com".to_string()]);
    }

    #[test]
    fn empty_configuration_falls_back_to_local_origins() {
        assert_eq!(resolve_allowed_origins(&[]), default_local_origins());
    }
}
