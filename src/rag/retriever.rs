use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use super::store::{RagStore, StoredChunk};
use crate::core::config::settings::RetrievalConfig;
use crate::core::errors::ApiError;
use crate::llm::{EmbeddingProvider, LlmError, Reranker};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(#[source] LlmError),
    #[error("reranking failed: {0}")]
    Rerank(#[source] LlmError),
    #[error("chunk store failed: {0}")]
    Store(#[from] ApiError),
    #[error("got {embeddings} embeddings for {texts} chunks")]
    CountMismatch { texts: usize, embeddings: usize },
}

/// Identity of an uploaded document in the chunk store.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRef {
    pub document_id: String,
    /// `{user_id}_{filename}`.
    pub source: String,
    pub user_id: String,
}

/// Embeds chunks into the store and answers similarity queries against it.
pub struct Retriever {
    store: Arc<dyn RagStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    candidate_k: usize,
    scope_to_user: bool,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn RagStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn Reranker>>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            candidate_k: config.candidate_k,
            scope_to_user: config.scope_to_user,
        }
    }

    /// Embeds `texts` and makes them the document's only chunks, replacing
    /// whatever an earlier upload of the same document stored. Nothing is
    /// written when embedding fails. Returns the number stored.
    pub async fn store_document(
        &self,
        document: &DocumentRef,
        texts: &[String],
    ) -> Result<usize, RetrievalError> {
        let started = Instant::now();
        tracing::info!(
            document_id = %document.document_id,
            chunks = texts.len(),
            "Starting embedding and storage"
        );

        let embeddings = self
            .embedder
            .embed(texts)
            .await
            .map_err(RetrievalError::Embedding)?;
        if embeddings.len() != texts.len() {
            return Err(RetrievalError::CountMismatch {
                texts: texts.len(),
                embeddings: embeddings.len(),
            });
        }
        let embedding_ms = started.elapsed().as_millis() as u64;

        let chunks: Vec<(StoredChunk, Vec<f32>)> = texts
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (text, embedding))| {
                let chunk = StoredChunk {
                    chunk_id: Uuid::new_v4().to_string(),
                    document_id: document.document_id.clone(),
                    chunk_index,
                    source: document.source.clone(),
                    user_id: document.user_id.clone(),
                    content: text.clone(),
                };
                (chunk, embedding)
            })
            .collect();

        let stored = chunks.len();
        let replaced = self
            .store
            .replace_document(&document.document_id, chunks)
            .await?;

        tracing::info!(
            chunks = stored,
            replaced,
            embedding_ms,
            total_ms = started.elapsed().as_millis() as u64,
            "Embedding and storage completed"
        );
        Ok(stored)
    }

    /// Drops every chunk of a document. Returns the number removed.
    pub async fn remove_document(&self, document_id: &str) -> Result<usize, RetrievalError> {
        let removed = self.store.delete_document(document_id).await?;
        tracing::info!(document_id, removed, "Document chunks removed");
        Ok(removed)
    }

    /// Top-`k` chunk texts for `query`, best first.
    pub async fn retrieve_similar_chunks(
        &self,
        query: &str,
        k: usize,
        user_id: Option<&str>,
    ) -> Result<Vec<String>, RetrievalError> {
        let started = Instant::now();
        tracing::info!(query_len = query.chars().count(), top_k = k, "Starting similarity search");

        let query_vector = self
            .embedder
            .embed_one(query)
            .await
            .map_err(RetrievalError::Embedding)?;

        let scope = if self.scope_to_user { user_id } else { None };
        let fetch = match self.reranker {
            Some(_) => self.candidate_k.max(k),
            None => k,
        };
        let hits = self.store.search(&query_vector, fetch, scope).await?;
        let texts: Vec<String> = hits.into_iter().map(|hit| hit.chunk.content).collect();

        let results = match &self.reranker {
            Some(reranker) if !texts.is_empty() => reranker
                .rerank(query, &texts, k)
                .await
                .map_err(RetrievalError::Rerank)?,
            _ => texts,
        };

        tracing::info!(
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            reranked = self.reranker.is_some(),
            "Similarity search completed"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::sqlite::SqliteRagStore;
    use async_trait::async_trait;

    /// Maps each text to a vector counting a few marker words.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model(&self) -> &str {
            "keyword"
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    ["password", "refund", "shipping"]
                        .iter()
                        .map(|word| lower.matches(word).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    struct ReverseReranker;

    #[async_trait]
    impl Reranker for ReverseReranker {
        async fn rerank(
            &self,
            _query: &str,
            texts: &[String],
            top_k: usize,
        ) -> Result<Vec<String>, LlmError> {
            Ok(texts.iter().rev().take(top_k).cloned().collect())
        }
    }

    async fn retriever_with(
        reranker: Option<Arc<dyn Reranker>>,
        scope_to_user: bool,
    ) -> (tempfile::TempDir, Retriever) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRagStore::with_path(dir.path().join("rag.db"))
            .await
            .unwrap();
        let config = RetrievalConfig {
            top_k: 5,
            candidate_k: 20,
            scope_to_user,
        };
        let retriever = Retriever::new(Arc::new(store), Arc::new(KeywordEmbedder), reranker, &config);
        (dir, retriever)
    }

    fn faq() -> DocumentRef {
        DocumentRef {
            document_id: "doc".to_string(),
            source: "u1_faq.txt".to_string(),
            user_id: "u1".to_string(),
        }
    }

    fn texts() -> Vec<String> {
        vec![
            "Reset your password from the login page.".to_string(),
            "Refund requests take five days.".to_string(),
            "Shipping is free over $50.".to_string(),
        ]
    }

    #[tokio::test]
    async fn stores_and_retrieves_most_similar_chunk() {
        let (_dir, retriever) = retriever_with(None, false).await;
        let stored = retriever.store_document(&faq(), &texts()).await.unwrap();
        assert_eq!(stored, 3);

        let results = retriever
            .retrieve_similar_chunks("I forgot my password", 1, Some("u1"))
            .await
            .unwrap();

        assert_eq!(results, vec!["Reset your password from the login page.".to_string()]);
    }

    #[tokio::test]
    async fn reranker_reorders_candidates() {
        let (_dir, retriever) = retriever_with(Some(Arc::new(ReverseReranker)), false).await;
        retriever.store_document(&faq(), &texts()).await.unwrap();

        let results = retriever
            .retrieve_similar_chunks("refund", 3, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_ne!(results[0], "Refund requests take five days.");
        assert_eq!(results[2], "Refund requests take five days.");
    }

    #[tokio::test]
    async fn scoping_hides_other_users_chunks() {
        let (_dir, retriever) = retriever_with(None, true).await;
        retriever.store_document(&faq(), &texts()).await.unwrap();

        let results = retriever
            .retrieve_similar_chunks("password", 5, Some("someone-else"))
            .await
            .unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn storing_a_document_again_replaces_its_chunks() {
        let (_dir, retriever) = retriever_with(None, false).await;
        retriever.store_document(&faq(), &texts()).await.unwrap();

        let updated = vec!["Refund requests take thirty days.".to_string()];
        retriever.store_document(&faq(), &updated).await.unwrap();

        let results = retriever
            .retrieve_similar_chunks("refund", 5, None)
            .await
            .unwrap();
        assert_eq!(results, updated);

        assert_eq!(retriever.remove_document("doc").await.unwrap(), 1);
        assert!(retriever
            .retrieve_similar_chunks("refund", 5, None)
            .await
            .unwrap()
            .is_empty());
    }
}
