use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::AppConfig;
use super::validation::{validate_config, validate_settings, ConfigError};

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 10] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "access_key",
    "access_token",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 4] = ["max_tokens", "input_tokens", "output_tokens", "tokens"];

/// Environment variables layered on top of the YAML files, and where they land.
const ENV_OVERRIDES: [(&str, &[&str]); 8] = [
    ("CLIENT_SECRET_KEY", &["auth", "client_secret"]),
    ("API_KEY", &["llm", "api_key"]),
    ("BASE_LLM_URL", &["llm", "base_url"]),
    ("BASE_EMBEDDING_URL", &["embedding", "url"]),
    ("RERANKER_API_KEY", &["reranker", "api_key"]),
    ("BASE_RERANKER_URL", &["reranker", "url"]),
    ("HOST", &["server", "host"]),
    ("PORT", &["server", "port"]),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    /// `config.yml` deep-merged with `secrets.yaml`, without env overrides.
    pub fn load_raw(&self) -> Result<Value, ConfigError> {
        let public_config = load_yaml_file(&self.paths.config_path)?;
        let secrets_config = load_yaml_file(&self.paths.secrets_path)?;
        Ok(deep_merge(&public_config, &secrets_config))
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with_env(|key| env::var(key).ok())
    }

    pub fn load_with_env<F>(&self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = self.load_raw()?;
        apply_env_overrides(&mut merged, lookup);
        validate_config(&merged)?;

        let config: AppConfig = serde_json::from_value(merged)?;
        validate_settings(&config)?;
        Ok(config)
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let value = serde_yaml::from_str::<Value>(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    match value {
        Value::Object(_) => Ok(value),
        // an empty YAML document parses as null
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ConfigError::Invalid {
            path: path.display().to_string(),
            reason: "top level must be a mapping".to_string(),
        }),
    }
}

fn apply_env_overrides<F>(config: &mut Value, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (var, path) in ENV_OVERRIDES {
        let Some(raw) = lookup(var) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let value = if var == "PORT" {
            raw.parse::<u64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.to_string()))
        } else {
            Value::String(raw.to_string())
        };
        ensure_object_path(config, path, value);
    }
}

pub(crate) fn ensure_object_path(config: &mut Value, path: &[&str], value: Value) {
    if path.is_empty() {
        return;
    }

    let mut current = config;
    for (index, key) in path.iter().enumerate() {
        if index == path.len() - 1 {
            if let Some(map) = current.as_object_mut() {
                map.insert(key.to_string(), value);
            }
            return;
        }

        if !current.get(*key).map(|v| v.is_object()).unwrap_or(false) {
            let Some(map) = current.as_object_mut() else {
                return;
            };
            map.insert((*key).to_string(), Value::Object(Map::new()));
        }

        let Some(next) = current.get_mut(*key) else {
            return;
        };
        current = next;
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

impl AppConfig {
    /// The configuration as JSON with secrets masked, for logging.
    pub fn redacted(&self) -> Value {
        serde_json::to_value(self)
            .map(|value| redact_sensitive_values(&value))
            .unwrap_or(Value::Null)
    }
}

pub fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}
