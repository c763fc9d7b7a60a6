//! Chunk store on an embedded SQLite database.
//!
//! Chunks are grouped by the document they came from, so a re-uploaded file
//! replaces its earlier chunks instead of adding to them. Search is a
//! brute-force cosine scan over vectors of the query's dimension.

use std::cmp::Ordering;
use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkSearchResult, RagStore, StoredChunk};
use super::vector;
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS document_chunks (
        chunk_id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        user_id TEXT NOT NULL,
        source TEXT NOT NULL,
        content TEXT NOT NULL,
        dimensions INTEGER NOT NULL,
        embedding BLOB NOT NULL,
        UNIQUE (document_id, chunk_index)
    )",
    "CREATE INDEX IF NOT EXISTS idx_chunks_user ON document_chunks(user_id)",
];

pub struct SqliteRagStore {
    pool: SqlitePool,
}

impl SqliteRagStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.rag_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to open chunk store: {}", e)))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| ApiError::internal(format!("Failed to prepare chunk store: {}", e)))?;
        }

        tracing::debug!(path = %db_path.display(), "Chunk store ready");
        Ok(Self { pool })
    }
}

/// Decodes one row; `Ok(None)` for an embedding blob that cannot be read.
fn decode_row(row: &SqliteRow) -> Result<Option<(StoredChunk, Vec<f32>)>, sqlx::Error> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    let chunk_id: String = row.try_get("chunk_id")?;
    let Some(embedding) = vector::decode(&blob) else {
        tracing::warn!(chunk_id = %chunk_id, "Skipping chunk with a corrupt embedding");
        return Ok(None);
    };
    let chunk_index: i64 = row.try_get("chunk_index")?;

    let chunk = StoredChunk {
        chunk_id,
        document_id: row.try_get("document_id")?,
        chunk_index: usize::try_from(chunk_index).unwrap_or_default(),
        source: row.try_get("source")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
    };
    Ok(Some((chunk, embedding)))
}

fn best_first(a: &ChunkSearchResult, b: &ChunkSearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
        .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
}

/// The `limit` best results, best first.
fn top_results(mut results: Vec<ChunkSearchResult>, limit: usize) -> Vec<ChunkSearchResult> {
    if limit == 0 {
        return Vec::new();
    }
    if results.len() > limit {
        results.select_nth_unstable_by(limit - 1, best_first);
        results.truncate(limit);
    }
    results.sort_by(best_first);
    results
}

#[async_trait]
impl RagStore for SqliteRagStore {
    async fn replace_document(
        &self,
        document_id: &str,
        chunks: Vec<(StoredChunk, Vec<f32>)>,
    ) -> Result<usize, ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        let removed = sqlx::query("DELETE FROM document_chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?
            .rows_affected();

        for (chunk, embedding) in &chunks {
            if chunk.document_id != document_id {
                return Err(ApiError::internal(format!(
                    "chunk {} belongs to document {}, not {}",
                    chunk.chunk_id, chunk.document_id, document_id
                )));
            }
            sqlx::query(
                "INSERT INTO document_chunks
                    (chunk_id, document_id, chunk_index, user_id, source, content, dimensions, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.user_id)
            .bind(&chunk.source)
            .bind(&chunk.content)
            .bind(embedding.len() as i64)
            .bind(vector::encode(embedding))
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        tracing::debug!(document_id, removed, inserted = chunks.len(), "Document chunks replaced");
        Ok(removed as usize)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected() as usize)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        user_id: Option<&str>,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let rows = sqlx::query(
            "SELECT chunk_id, document_id, chunk_index, user_id, source, content, embedding
             FROM document_chunks
             WHERE dimensions = ?1 AND (?2 IS NULL OR user_id = ?2)",
        )
        .bind(query_embedding.len() as i64)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some((chunk, embedding)) = decode_row(row).map_err(ApiError::internal)? {
                results.push(ChunkSearchResult {
                    score: vector::cosine(query_embedding, &embedding),
                    chunk,
                });
            }
        }
        Ok(top_results(results, limit))
    }

    async fn count(&self, user_id: Option<&str>) -> Result<usize, ApiError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE ?1 IS NULL OR user_id = ?1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, SqliteRagStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRagStore::with_path(dir.path().join("rag.db"))
            .await
            .unwrap();
        (dir, store)
    }

    fn chunk(document: &str, index: usize, content: &str, user: &str) -> StoredChunk {
        StoredChunk {
            chunk_id: format!("{}-{}", document, index),
            document_id: document.to_string(),
            chunk_index: index,
            source: format!("{}_guide.txt", user),
            user_id: user.to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let (_dir, store) = test_store().await;
        store
            .replace_document(
                "faq",
                vec![
                    (chunk("faq", 0, "Billing questions", "u1"), vec![1.0, 0.0, 0.0]),
                    (chunk("faq", 1, "Password reset", "u1"), vec![0.0, 1.0, 0.0]),
                    (chunk("faq", 2, "Refund policy", "u1"), vec![0.7, 0.7, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 2, None).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.content, "Billing questions");
        assert!(results[0].score > 0.99);
        assert_eq!(results[1].chunk.content, "Refund policy");
        assert_eq!(results[1].chunk.chunk_index, 2);
    }

    #[tokio::test]
    async fn replacing_a_document_drops_its_earlier_chunks() {
        let (_dir, store) = test_store().await;
        store
            .replace_document(
                "faq",
                vec![
                    (chunk("faq", 0, "Refunds take five days.", "u1"), vec![1.0, 0.0]),
                    (chunk("faq", 1, "Shipping is free.", "u1"), vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        store
            .replace_document("other", vec![(chunk("other", 0, "Unrelated.", "u1"), vec![0.5, 0.5])])
            .await
            .unwrap();

        let removed = store
            .replace_document(
                "faq",
                vec![(chunk("faq", 0, "Refunds take thirty days.", "u1"), vec![1.0, 0.0])],
            )
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.count(Some("u1")).await.unwrap(), 2);
        let contents: Vec<String> = store
            .search(&[1.0, 0.0], 10, None)
            .await
            .unwrap()
            .into_iter()
            .map(|hit| hit.chunk.content)
            .collect();
        assert_eq!(contents, vec!["Refunds take thirty days.", "Unrelated."]);
    }

    #[tokio::test]
    async fn chunks_of_another_document_are_rejected_without_side_effects() {
        let (_dir, store) = test_store().await;
        store
            .replace_document("faq", vec![(chunk("faq", 0, "kept", "u1"), vec![1.0])])
            .await
            .unwrap();

        let result = store
            .replace_document("faq", vec![(chunk("stray", 0, "stray", "u1"), vec![1.0])])
            .await;

        assert!(result.is_err());
        assert_eq!(store.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_document_leaves_other_documents() {
        let (_dir, store) = test_store().await;
        store
            .replace_document("a", vec![(chunk("a", 0, "alpha", "u1"), vec![1.0]), (chunk("a", 1, "beta", "u1"), vec![1.0])])
            .await
            .unwrap();
        store
            .replace_document("b", vec![(chunk("b", 0, "gamma", "u2"), vec![1.0])])
            .await
            .unwrap();

        assert_eq!(store.delete_document("a").await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert_eq!(store.count(Some("u1")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_can_be_scoped_to_a_user_and_skips_other_dimensions() {
        let (_dir, store) = test_store().await;
        store
            .replace_document("a", vec![(chunk("a", 0, "alpha", "u1"), vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .replace_document("b", vec![(chunk("b", 0, "beta", "u2"), vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .replace_document("c", vec![(chunk("c", 0, "gamma", "u2"), vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let scoped = store.search(&[1.0, 0.0], 10, Some("u2")).await.unwrap();

        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].chunk.content, "beta");
        assert!(store.search(&[1.0, 0.0], 0, None).await.unwrap().is_empty());
    }
}
