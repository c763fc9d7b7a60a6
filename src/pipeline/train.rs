use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use super::{format_secs, preview};
use crate::core::errors::ApiError;
use crate::history::{document_id, document_source, DocumentStore};
use crate::rag::{
    extract_text, DocumentRef, ExtractError, RecursiveChunker, RetrievalError, Retriever,
};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("document storage failed: {0}")]
    Storage(#[source] ApiError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

impl From<TrainError> for ApiError {
    fn from(err: TrainError) -> Self {
        match err {
            TrainError::Validation(message) => ApiError::BadRequest(message),
            TrainError::Extract(err) => ApiError::BadRequest(err.to_string()),
            other => ApiError::upstream("Training failed", other),
        }
    }
}

/// A file received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Time spent receiving the file body.
    pub read_time: Duration,
}

#[derive(Debug, Serialize)]
pub struct TrainTimings {
    pub file_read: String,
    pub text_extraction: String,
    pub document_save: String,
    pub chunking: String,
    pub metadata: String,
    pub vector_storage: String,
    pub total: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessingSummary {
    pub total_chunks: usize,
    pub file_size: usize,
    pub text_length: usize,
    pub processing_time: String,
    pub timing_breakdown: TrainTimings,
}

#[derive(Debug, Serialize)]
pub struct StorageInfo {
    pub vector_db: &'static str,
    pub document_db: &'static str,
    pub chunks_stored: usize,
    pub file_stored: bool,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub user_id: String,
    pub filename: String,
    pub processing_summary: ProcessingSummary,
    pub storage_info: StorageInfo,
    pub status: &'static str,
    pub message: String,
}

/// Ingests a document: extract, chunk, embed and store, then record the upload.
pub struct TrainFlow {
    documents: DocumentStore,
    retriever: Arc<Retriever>,
    chunker: RecursiveChunker,
}

impl TrainFlow {
    pub fn new(documents: DocumentStore, retriever: Arc<Retriever>, chunker: RecursiveChunker) -> Self {
        Self {
            documents,
            retriever,
            chunker,
        }
    }

    pub async fn train(&self, user_id: &str, upload: Upload) -> Result<TrainResponse, TrainError> {
        let started = Instant::now();

        if user_id.trim().is_empty() {
            return Err(TrainError::Validation("user_id is required".to_string()));
        }
        if upload.filename.trim().is_empty() {
            return Err(TrainError::Extract(ExtractError::Missing));
        }

        let source = document_source(user_id, &upload.filename);
        tracing::info!(
            user_id,
            file = %source,
            size = upload.bytes.len(),
            "Starting training process"
        );

        let extract_start = Instant::now();
        let text = extract_text(&upload.bytes, &upload.filename)?;
        let text_extraction = extract_start.elapsed();
        let text_length = text.chars().count();
        tracing::info!(
            elapsed = %format_secs(text_extraction),
            text_length,
            "Text extraction completed"
        );
        tracing::debug!(preview = %preview(&text, 200), "Extracted text preview");

        let chunk_start = Instant::now();
        let chunks = self.chunker.split(&text);
        let chunking = chunk_start.elapsed();
        tracing::info!(elapsed = %format_secs(chunking), chunks = chunks.len(), "Document chunking completed");

        if chunks.is_empty() {
            tracing::error!(user_id, file = %source, "No chunks generated from document");
            return Err(TrainError::Validation(
                "No chunks generated from document".to_string(),
            ));
        }

        let metadata_start = Instant::now();
        let document = DocumentRef {
            document_id: document_id(user_id, &upload.filename),
            source: source.clone(),
            user_id: user_id.to_string(),
        };
        let metadata_time = metadata_start.elapsed();

        // chunks first: the document row is only listed once its chunks exist
        let vector_start = Instant::now();
        let stored = self.retriever.store_document(&document, &chunks).await?;
        let vector_storage = vector_start.elapsed();

        let save_start = Instant::now();
        if let Err(err) = self
            .documents
            .save_uploaded_document(user_id, &upload.filename, &text)
            .await
        {
            if let Err(rollback) = self.retriever.remove_document(&document.document_id).await {
                tracing::error!(
                    document_id = %document.document_id,
                    error = %rollback,
                    "Failed to remove chunks of unsaved document"
                );
            }
            return Err(TrainError::Storage(err));
        }
        let document_save = save_start.elapsed();

        let total = started.elapsed() + upload.read_time;
        tracing::info!(
            user_id,
            file = %source,
            elapsed = %format_secs(total),
            "Training process completed"
        );

        Ok(TrainResponse {
            user_id: user_id.to_string(),
            filename: upload.filename.clone(),
            processing_summary: ProcessingSummary {
                total_chunks: chunks.len(),
                file_size: upload.bytes.len(),
                text_length,
                processing_time: chrono::Utc::now().to_rfc3339(),
                timing_breakdown: TrainTimings {
                    file_read: format_secs(upload.read_time),
                    text_extraction: format_secs(text_extraction),
                    document_save: format_secs(document_save),
                    chunking: format_secs(chunking),
                    metadata: format_secs(metadata_time),
                    vector_storage: format_secs(vector_storage),
                    total: format_secs(total),
                },
            },
            storage_info: StorageInfo {
                vector_db: "sqlite",
                document_db: "sqlite",
                chunks_stored: stored,
                file_stored: true,
            },
            status: "success",
            message: format!("Document '{}' processed and stored successfully", upload.filename),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::settings::RetrievalConfig;
    use crate::llm::{EmbeddingProvider, LlmError};
    use crate::rag::{RagStore, SqliteRagStore};
    use async_trait::async_trait;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        fn model(&self) -> &str {
            "length"
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(inputs
                .iter()
                .map(|text| vec![text.len() as f32, 1.0])
                .collect())
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        fn model(&self) -> &str {
            "down"
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Err(LlmError::invalid("embedding", "service unavailable"))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        documents: DocumentStore,
        store: Arc<SqliteRagStore>,
        flow: TrainFlow,
    }

    async fn fixture(embedder: Arc<dyn EmbeddingProvider>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let documents = DocumentStore::new(dir.path().join("helpdesk.db")).await.unwrap();
        let store = Arc::new(
            SqliteRagStore::with_path(dir.path().join("rag.db"))
                .await
                .unwrap(),
        );
        let retriever = Arc::new(Retriever::new(
            store.clone(),
            embedder,
            None,
            &RetrievalConfig::default(),
        ));
        let flow = TrainFlow::new(documents.clone(), retriever, RecursiveChunker::new(40, 5));
        Fixture {
            _dir: dir,
            documents,
            store,
            flow,
        }
    }

    fn upload(text: &str) -> Upload {
        Upload {
            filename: "guide.txt".to_string(),
            bytes: text.as_bytes().to_vec(),
            read_time: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn retraining_a_file_replaces_its_chunks() {
        let fx = fixture(Arc::new(LengthEmbedder)).await;

        let first = fx
            .flow
            .train("u1", upload("Refunds take five days. Shipping is free over fifty dollars."))
            .await
            .unwrap();
        assert!(first.processing_summary.total_chunks > 1);

        let second = fx.flow.train("u1", upload("Refunds take thirty days.")).await.unwrap();

        assert_eq!(second.storage_info.chunks_stored, 1);
        assert_eq!(fx.store.count(Some("u1")).await.unwrap(), 1);
        let hits = fx.store.search(&[25.0, 1.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "Refunds take thirty days.");
        assert_eq!(fx.documents.documents_for_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_embedding_leaves_no_document_behind() {
        let fx = fixture(Arc::new(DownEmbedder)).await;

        let result = fx.flow.train("u1", upload("Refunds take five days.")).await;

        assert!(matches!(result, Err(TrainError::Retrieval(_))));
        assert!(fx.documents.documents_for_user("u1").await.unwrap().is_empty());
        assert_eq!(fx.store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_documents_are_not_saved() {
        let fx = fixture(Arc::new(LengthEmbedder)).await;

        let result = fx.flow.train("u1", upload("   \n  ")).await;

        assert!(matches!(result, Err(TrainError::Validation(_))));
        assert!(fx.documents.documents_for_user("u1").await.unwrap().is_empty());
    }
}
