use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::error::LlmError;
use super::provider::Reranker;
use crate::core::config::settings::RerankerConfig;

const SERVICE: &str = "reranker";

/// Client for Cohere-style `/rerank` endpoints.
#[derive(Clone)]
pub struct HttpReranker {
    url: String,
    api_key: String,
    model: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<RerankHit>,
}

#[derive(Debug, Deserialize)]
struct RerankHit {
    index: usize,
    relevance_score: f64,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| LlmError::Network {
                service: SERVICE,
                source,
            })?;
        Ok(Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        texts: &[String],
        top_k: usize,
    ) -> Result<Vec<String>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "query": query,
            "documents": texts,
            "top_n": top_k,
        });

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| LlmError::Network {
                service: SERVICE,
                source,
            })?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                service: SERVICE,
                status: status.as_u16(),
                body: text,
            });
        }

        let response: RerankResponse = res.json().await.map_err(|source| LlmError::Network {
            service: SERVICE,
            source,
        })?;
        Ok(order_by_relevance(response.results, texts, top_k))
    }
}

fn order_by_relevance(mut hits: Vec<RerankHit>, texts: &[String], top_k: usize) -> Vec<String> {
    hits.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.into_iter()
        .filter_map(|hit| texts.get(hit.index).cloned())
        .take(top_k)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_hits_by_score_and_truncates() {
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let hits = vec![
            RerankHit {
                index: 0,
                relevance_score: 0.1,
            },
            RerankHit {
                index: 2,
                relevance_score: 0.9,
            },
            RerankHit {
                index: 1,
                relevance_score: 0.5,
            },
        ];

        let ordered = order_by_relevance(hits, &texts, 2);

        assert_eq!(ordered, vec!["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn ignores_out_of_range_indices() {
        let texts = vec!["only".to_string()];
        let hits = vec![
            RerankHit {
                index: 5,
                relevance_score: 0.99,
            },
            RerankHit {
                index: 0,
                relevance_score: 0.2,
            },
        ];

        assert_eq!(order_by_relevance(hits, &texts, 5), vec!["only".to_string()]);
    }
}
