use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to initialize document store: {0}")]
    Documents(#[source] anyhow::Error),

    #[error("Failed to initialize RAG store: {0}")]
    Rag(#[source] anyhow::Error),

    #[error("Failed to initialize LLM client: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("Failed to initialize reranker: {0}")]
    Reranker(#[source] anyhow::Error),
}
