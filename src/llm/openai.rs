//! OpenAI-compatible HTTP clients for chat completions and embeddings.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::error::LlmError;
use super::provider::{ChatProvider, EmbeddingProvider};
use super::types::{ChatCompletion, ChatRequest};
use crate::core::config::settings::{EmbeddingConfig, LlmConfig};

const CHAT_SERVICE: &str = "chat";
const EMBEDDING_SERVICE: &str = "embedding";

fn build_client(timeout_secs: u64) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|source| LlmError::Network {
            service: CHAT_SERVICE,
            source,
        })
}

#[derive(Clone)]
pub struct OpenAiChatClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    client: Client,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "stream": false,
        });

        let started = Instant::now();
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| LlmError::Network {
                service: CHAT_SERVICE,
                source,
            })?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Chat completion request failed"
            );
            return Err(LlmError::Api {
                service: CHAT_SERVICE,
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = res.json().await.map_err(|source| LlmError::Network {
            service: CHAT_SERVICE,
            source,
        })?;
        let completion = parse_chat_completion(&payload)?;
        tracing::debug!(
            model = %completion.model,
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chat completion received"
        );
        Ok(completion)
    }
}

pub(crate) fn parse_chat_completion(payload: &Value) -> Result<ChatCompletion, LlmError> {
    let content = payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .ok_or_else(|| LlmError::invalid(CHAT_SERVICE, "missing choices[0].message.content"))?;

    let usage = payload.get("usage");
    let token_count = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    };

    Ok(ChatCompletion {
        content: content.to_string(),
        model: payload
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string(),
        input_tokens: token_count("prompt_tokens"),
        output_tokens: token_count("completion_tokens"),
    })
}

#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: &EmbeddingConfig, llm: &LlmConfig) -> Result<Self, LlmError> {
        tracing::debug!(model = %config.model, url = %config.url, "Initialized embedding client");
        Ok(Self {
            url: config.url.clone(),
            api_key: config.effective_api_key(llm).to_string(),
            model: config.model.clone(),
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if inputs.is_empty() {
            tracing::warn!("Empty input list received for embedding");
            return Ok(Vec::new());
        }

        let total_chars: usize = inputs.iter().map(|text| text.chars().count()).sum();
        tracing::info!(
            count = inputs.len(),
            total_chars,
            model = %self.model,
            "Starting text embedding"
        );

        let started = Instant::now();
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| LlmError::Network {
                service: EMBEDDING_SERVICE,
                source,
            })?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                service: EMBEDDING_SERVICE,
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = res.json().await.map_err(|source| LlmError::Network {
            service: EMBEDDING_SERVICE,
            source,
        })?;
        let embeddings = parse_embeddings(&payload, inputs.len())?;

        tracing::info!(
            count = embeddings.len(),
            dimension = embeddings.first().map(Vec::len).unwrap_or(0),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Text embedding completed"
        );
        Ok(embeddings)
    }
}

pub(crate) fn parse_embeddings(payload: &Value, expected: usize) -> Result<Vec<Vec<f32>>, LlmError> {
    let data = payload
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| LlmError::invalid(EMBEDDING_SERVICE, "missing data array"))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let values = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| LlmError::invalid(EMBEDDING_SERVICE, "missing embedding vector"))?;
        let vector = values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| {
                LlmError::invalid(
                    EMBEDDING_SERVICE,
                    format!("non-numeric component in embedding {}", position),
                )
            })?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);

    if indexed.len() != expected {
        return Err(LlmError::invalid(
            EMBEDDING_SERVICE,
            format!("expected {} embeddings, got {}", expected, indexed.len()),
        ));
    }

    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_completion_with_usage() {
        let payload = json!({
            "model": "gpt-3.5-turbo-0125",
            "choices": [{ "message": { "role": "assistant", "content": "Hello!" } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
        });

        let completion = parse_chat_completion(&payload).unwrap();

        assert_eq!(completion.content, "Hello!");
        assert_eq!(completion.model, "gpt-3.5-turbo-0125");
        assert_eq!(completion.input_tokens, 12);
        assert_eq!(completion.output_tokens, 3);
    }

    #[test]
    fn missing_usage_defaults_to_zero_tokens() {
        let payload = json!({
            "choices": [{ "message": { "content": "ok" } }]
        });

        let completion = parse_chat_completion(&payload).unwrap();

        assert_eq!(completion.input_tokens, 0);
        assert_eq!(completion.output_tokens, 0);
        assert_eq!(completion.model, "");
    }

    #[test]
    fn missing_choices_is_invalid_response() {
        let payload = json!({ "choices": [] });

        let err = parse_chat_completion(&payload).unwrap_err();

        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[test]
    fn embeddings_are_returned_in_index_order() {
        let payload = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });

        let vectors = parse_embeddings(&payload, 2).unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn embedding_count_mismatch_is_rejected() {
        let payload = json!({ "data": [{ "embedding": [1.0] }] });

        assert!(parse_embeddings(&payload, 2).is_err());
    }

    #[test]
    fn non_numeric_embedding_components_are_rejected() {
        let payload = json!({ "data": [{ "index": 0, "embedding": [0.5, "oops", 0.25] }] });

        let err = parse_embeddings(&payload, 1).unwrap_err();

        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }
}
