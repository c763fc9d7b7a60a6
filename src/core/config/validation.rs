use serde_json::{Map, Value};
use thiserror::Error;

use super::settings::AppConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config at '{path}': {reason}")]
    Invalid { path: String, reason: String },
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Config does not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

impl ConfigError {
    fn invalid(path: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Structural checks on the raw merged document, before deserialization.
pub fn validate_config(config: &Value) -> Result<(), ConfigError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 1, 65_535)?;
        validate_u64_field(
            server,
            "server.max_upload_bytes",
            "max_upload_bytes",
            1,
            1_073_741_824,
        )?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(auth) = expect_optional_object(root, "auth")? {
        validate_optional_string_field(auth, "auth.client_secret", "client_secret")?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 86_400)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.url", "url")?;
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.timeout_secs", "timeout_secs", 1, 86_400)?;
    }

    if let Some(reranker) = expect_optional_object(root, "reranker")? {
        validate_bool_field(reranker, "reranker.enabled", "enabled")?;
        validate_optional_string_field(reranker, "reranker.url", "url")?;
        validate_u64_field(reranker, "reranker.timeout_secs", "timeout_secs", 1, 86_400)?;
    }

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(chunking, "chunking.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(
            chunking,
            "chunking.chunk_overlap",
            "chunk_overlap",
            0,
            1_000_000,
        )?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 1_000)?;
        validate_u64_field(retrieval, "retrieval.candidate_k", "candidate_k", 1, 10_000)?;
        validate_bool_field(retrieval, "retrieval.scope_to_user", "scope_to_user")?;
    }

    if let Some(history) = expect_optional_object(root, "history")? {
        validate_u64_field(history, "history.turns", "turns", 0, 100)?;
    }

    if let Some(evaluation) = expect_optional_object(root, "evaluation")? {
        validate_bool_field(evaluation, "evaluation.judge_enabled", "judge_enabled")?;
        validate_u64_field(evaluation, "evaluation.top_k", "top_k", 1, 1_000)?;
        validate_u64_field(
            evaluation,
            "evaluation.relevancy_questions",
            "relevancy_questions",
            1,
            20,
        )?;
    }

    if let Some(logging) = expect_optional_object(root, "logging")? {
        validate_optional_string_field(logging, "logging.level", "level")?;
    }

    Ok(())
}

/// Cross-field checks on the typed configuration.
pub fn validate_settings(config: &AppConfig) -> Result<(), ConfigError> {
    if config.auth.client_secret.trim().is_empty() {
        return Err(ConfigError::invalid(
            "auth.client_secret",
            "a client secret is required (set CLIENT_SECRET_KEY)",
        ));
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        return Err(ConfigError::invalid(
            "chunking.chunk_overlap",
            format!(
                "must be smaller than chunk_size ({})",
                config.chunking.chunk_size
            ),
        ));
    }
    if config.reranker.enabled && config.reranker.api_key.trim().is_empty() {
        return Err(ConfigError::invalid(
            "reranker.api_key",
            "required when the reranker is enabled (set RERANKER_API_KEY)",
        ));
    }
    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ConfigError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ConfigError::invalid(
            path,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ConfigError::invalid(
                &format!("{}[{}]", path, index),
                "value cannot be empty",
            ));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ConfigError {
    ConfigError::invalid(path, format!("expected {}", expected))
}
