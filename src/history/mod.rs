//! Uploaded documents, chat turns and sessions, persisted in SQLite.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedDocument {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub content: String,
    pub upload_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub user_id: String,
    pub session_id: String,
    pub query: String,
    pub response: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub created_at: String,
    pub status: String,
}

/// `{user_id}_{filename}`: the name chunks and documents are stored under.
pub fn document_source(user_id: &str, filename: &str) -> String {
    format!("{}_{}", user_id, filename)
}

/// Stable document id: sha256 hex of the document source name.
pub fn document_id(user_id: &str, filename: &str) -> String {
    hex::encode(Sha256::digest(document_source(user_id, filename).as_bytes()))
}

#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let conn_str = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to document db: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS uploaded_documents (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                content TEXT NOT NULL,
                upload_time TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init documents table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chat_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init chat table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init sessions table: {}", e)))?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_documents_user ON uploaded_documents(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_chat_session ON chat_turns(session_id)",
        ] {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;
        }

        Ok(Self { pool })
    }

    /// Stores extracted document text. Uploading the same file name again
    /// replaces the earlier row.
    pub async fn save_uploaded_document(
        &self,
        user_id: &str,
        filename: &str,
        content: &str,
    ) -> Result<UploadedDocument, ApiError> {
        let document = UploadedDocument {
            id: document_id(user_id, filename),
            user_id: user_id.to_string(),
            filename: filename.to_string(),
            content: content.to_string(),
            upload_time: chrono::Utc::now().to_rfc3339(),
        };

        sqlx::query(
            "INSERT OR REPLACE INTO uploaded_documents (id, user_id, filename, content, upload_time)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&document.id)
        .bind(&document.user_id)
        .bind(&document.filename)
        .bind(&document.content)
        .bind(&document.upload_time)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        tracing::info!(user_id, filename, doc_id = %document.id, "Document saved");
        Ok(document)
    }

    pub async fn documents_for_user(&self, user_id: &str) -> Result<Vec<UploadedDocument>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, user_id, filename, content, upload_time
             FROM uploaded_documents WHERE user_id = ? ORDER BY upload_time ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let documents: Vec<UploadedDocument> = rows
            .iter()
            .map(|row| UploadedDocument {
                id: row.get("id"),
                user_id: row.get("user_id"),
                filename: row.get("filename"),
                content: row.get("content"),
                upload_time: row.get("upload_time"),
            })
            .collect();

        tracing::info!(user_id, count = documents.len(), "Documents retrieved");
        Ok(documents)
    }

    pub async fn save_chat_turn(
        &self,
        user_id: &str,
        session_id: &str,
        query: &str,
        response: &str,
    ) -> Result<ChatTurn, ApiError> {
        let turn = ChatTurn {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            query: query.to_string(),
            response: response.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        sqlx::query(
            "INSERT INTO chat_turns (user_id, session_id, query, response, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&turn.user_id)
        .bind(&turn.session_id)
        .bind(&turn.query)
        .bind(&turn.response)
        .bind(&turn.timestamp)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        tracing::info!(user_id, session_id, "Chat turn saved");
        Ok(turn)
    }

    /// The last `turns` exchanges of a session, oldest first, as
    /// `QUERY: ...` / `RESPONSE: ...` line pairs.
    pub async fn chat_history(&self, session_id: &str, turns: usize) -> Result<Vec<String>, ApiError> {
        if turns == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT query, response FROM (
                SELECT id, query, response FROM chat_turns
                WHERE session_id = ? ORDER BY id DESC LIMIT ?
             ) ORDER BY id ASC",
        )
        .bind(session_id)
        .bind(turns as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut lines = Vec::with_capacity(rows.len() * 2);
        for row in &rows {
            let query: String = row.get("query");
            let response: String = row.get("response");
            lines.push(format!("QUERY: {}", query));
            lines.push(format!("RESPONSE: {}", response));
        }

        tracing::info!(session_id, chats = rows.len(), "Chat history retrieved");
        Ok(lines)
    }

    pub async fn create_session(&self, user_id: &str) -> Result<SessionRecord, ApiError> {
        let record = SessionRecord {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            status: "active".to_string(),
        };

        sqlx::query("INSERT INTO sessions (session_id, user_id, created_at, status) VALUES (?, ?, ?, ?)")
            .bind(&record.session_id)
            .bind(&record.user_id)
            .bind(&record.created_at)
            .bind(&record.status)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(record)
    }

    /// Removes a session and its chat turns. Returns the number of turns deleted.
    pub async fn delete_session(&self, session_id: &str) -> Result<u64, ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        let result = sqlx::query("DELETE FROM chat_turns WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }
}
