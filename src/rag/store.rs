//! Storage interface for embedded document chunks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// One chunk of an uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredChunk {
    pub chunk_id: String,
    /// Same id as the document row in the document store.
    pub document_id: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// `{user_id}_{filename}` of the uploaded document.
    pub source: String,
    pub user_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk: StoredChunk,
    /// Cosine similarity, higher is better.
    pub score: f64,
}

#[async_trait]
pub trait RagStore: Send + Sync {
    /// Swaps every chunk of `document_id` for `chunks` in one transaction.
    /// Returns how many earlier chunks were dropped.
    async fn replace_document(
        &self,
        document_id: &str,
        chunks: Vec<(StoredChunk, Vec<f32>)>,
    ) -> Result<usize, ApiError>;

    /// Removes every chunk of a document. Returns the number removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize, ApiError>;

    /// Chunks most similar to `query_embedding`, best first, at most `limit`.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        user_id: Option<&str>,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    /// Chunk count, optionally for one user.
    async fn count(&self, user_id: Option<&str>) -> Result<usize, ApiError>;
}
