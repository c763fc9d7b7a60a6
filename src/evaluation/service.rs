use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use super::evaluator::{EvaluationError, RagasEvaluator};
use super::types::{EvaluationMetrics, EvaluationReport};
use crate::core::errors::ApiError;
use crate::history::DocumentStore;
use crate::llm::{ChatProvider, ChatRequest, LlmError};
use crate::prompt::render_evaluation_prompt;
use crate::rag::{RetrievalError, Retriever};

pub const DEFAULT_EXPORT_FILE: &str = "evaluation_results.json";

#[derive(Debug, Error)]
pub enum EvaluationFlowError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("chat history failed: {0}")]
    History(#[source] ApiError),
    #[error("answer generation failed: {0}")]
    Llm(#[from] LlmError),
    #[error("{0}")]
    InvalidPath(String),
    #[error(transparent)]
    Export(#[from] EvaluationError),
}

impl From<EvaluationFlowError> for ApiError {
    fn from(err: EvaluationFlowError) -> Self {
        match err {
            EvaluationFlowError::InvalidPath(message) => ApiError::BadRequest(message),
            EvaluationFlowError::Export(err) => ApiError::upstream("Failed to export results", err),
            other => ApiError::upstream("Evaluation failed", other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResponse {
    pub query: String,
    pub answer: String,
    pub context_chunks: Vec<String>,
    pub metrics: EvaluationMetrics,
    pub metadata: Map<String, Value>,
    pub evaluation_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub filepath: PathBuf,
    pub count: usize,
}

/// Runs the evaluation variant of the answer pipeline and scores the result.
pub struct EvaluationService {
    documents: DocumentStore,
    retriever: Arc<Retriever>,
    chat: Arc<dyn ChatProvider>,
    evaluator: RagasEvaluator,
    top_k: usize,
    history_turns: usize,
    export_dir: PathBuf,
}

impl EvaluationService {
    pub fn new(
        documents: DocumentStore,
        retriever: Arc<Retriever>,
        chat: Arc<dyn ChatProvider>,
        evaluator: RagasEvaluator,
        top_k: usize,
        history_turns: usize,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            documents,
            retriever,
            chat,
            evaluator,
            top_k,
            history_turns,
            export_dir,
        }
    }

    pub fn evaluator(&self) -> &RagasEvaluator {
        &self.evaluator
    }

    pub async fn evaluate_query(
        &self,
        query: &str,
        session_id: &str,
        user_id: &str,
        include_metadata: bool,
    ) -> Result<EvaluationResponse, EvaluationFlowError> {
        let started = Instant::now();

        let context = self
            .retriever
            .retrieve_similar_chunks(query, self.top_k, Some(user_id))
            .await?;
        let history = self
            .documents
            .chat_history(session_id, self.history_turns)
            .await
            .map_err(EvaluationFlowError::History)?;

        let prompt = render_evaluation_prompt(&context, query);
        let completion = self.chat.chat(ChatRequest::from_prompt(prompt)).await?;

        let metadata = if include_metadata {
            match json!({
                "session_id": session_id,
                "user_id": user_id,
                "chat_history_length": history.len(),
                "chunks_retrieved": context.len(),
                "model": completion.model,
                "input_tokens": completion.input_tokens,
                "output_tokens": completion.output_tokens,
            }) {
                Value::Object(map) => map,
                _ => Map::new(),
            }
        } else {
            Map::new()
        };

        let record = self
            .evaluator
            .evaluate_response(query, &completion.content, &context, metadata)
            .await;

        Ok(EvaluationResponse {
            query: record.query,
            answer: record.answer,
            context_chunks: record.context_chunks,
            metrics: record.metrics,
            metadata: record.metadata,
            evaluation_time: started.elapsed().as_secs_f64(),
        })
    }

    /// Evaluates queries one after another; failed queries are logged and skipped.
    pub async fn evaluate_batch(
        &self,
        queries: &[String],
        session_id: &str,
        user_id: &str,
        include_metadata: bool,
    ) -> Vec<EvaluationResponse> {
        let mut results = Vec::with_capacity(queries.len());
        for (i, query) in queries.iter().enumerate() {
            match self
                .evaluate_query(query, session_id, user_id, include_metadata)
                .await
            {
                Ok(result) => {
                    results.push(result);
                    tracing::info!("Completed evaluation {}/{}", i + 1, queries.len());
                }
                Err(err) => {
                    tracing::error!(error = ?err, "Failed to evaluate query {}", i + 1);
                }
            }
        }
        results
    }

    pub async fn report(&self) -> EvaluationReport {
        self.evaluator.report().await
    }

    pub async fn export(&self, filepath: Option<&str>) -> Result<ExportOutcome, EvaluationFlowError> {
        let path = resolve_export_path(&self.export_dir, filepath)?;
        let count = self.evaluator.export(&path).await?;
        Ok(ExportOutcome {
            filepath: path,
            count,
        })
    }
}

/// Resolves a client-supplied export path under `export_dir`. Only relative
/// paths without `..` components are accepted.
pub fn resolve_export_path(export_dir: &Path, filepath: Option<&str>) -> Result<PathBuf, EvaluationFlowError> {
    let requested = filepath
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_EXPORT_FILE);
    let relative = Path::new(requested);

    let safe = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(EvaluationFlowError::InvalidPath(format!(
            "Export path must be relative and stay inside the export directory: {}",
            requested
        )));
    }
    if relative.file_name().is_none() {
        return Err(EvaluationFlowError::InvalidPath(format!(
            "Export path must name a file: {}",
            requested
        )));
    }

    Ok(export_dir.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_export_path_is_used_when_missing() {
        let dir = Path::new("/srv/exports");

        assert_eq!(
            resolve_export_path(dir, None).unwrap(),
            dir.join(DEFAULT_EXPORT_FILE)
        );
        assert_eq!(
            resolve_export_path(dir, Some("  ")).unwrap(),
            dir.join(DEFAULT_EXPORT_FILE)
        );
    }

    #[test]
    fn nested_relative_paths_are_allowed() {
        let dir = Path::new("/srv/exports");

        assert_eq!(
            resolve_export_path(dir, Some("runs/june.json")).unwrap(),
            dir.join("runs/june.json")
        );
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let dir = Path::new("/srv/exports");

        for bad in ["../secrets.json", "/etc/passwd", "runs/../../x.json", "."] {
            assert!(
                matches!(resolve_export_path(dir, Some(bad)), Err(EvaluationFlowError::InvalidPath(_))),
                "accepted {}",
                bad
            );
        }
    }
}
