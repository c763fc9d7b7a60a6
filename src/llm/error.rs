use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error {status} from {service}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("network error calling {service}: {source}")]
    Network {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid response format from {service}: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },
}

impl LlmError {
    pub fn invalid(service: &'static str, reason: impl Into<String>) -> Self {
        LlmError::InvalidResponse {
            service,
            reason: reason.into(),
        }
    }
}
