use async_trait::async_trait;

use super::error::LlmError;
use super::types::{ChatCompletion, ChatRequest};

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// return the provider name for logs (e.g. "openai")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    /// embeddings in input order; empty input performs no request
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    async fn embed_one(&self, input: &str) -> Result<Vec<f32>, LlmError> {
        let mut vectors = self.embed(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| LlmError::invalid("embedding", "no embedding returned"))
    }
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// top `top_k` texts ordered by relevance to `query`, best first
    async fn rerank(
        &self,
        query: &str,
        texts: &[String],
        top_k: usize,
    ) -> Result<Vec<String>, LlmError>;
}
