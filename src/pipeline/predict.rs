use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use super::{format_secs, preview};
use crate::core::errors::ApiError;
use crate::history::DocumentStore;
use crate::llm::{ChatProvider, ChatRequest, LlmError};
use crate::prompt::render_context_prompt;
use crate::rag::{RetrievalError, Retriever};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("chat history failed: {0}")]
    History(#[source] ApiError),
    #[error("completion failed: {0}")]
    Llm(#[from] LlmError),
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        ApiError::upstream("Prediction failed", err)
    }
}

#[derive(Debug, Serialize)]
pub struct PredictTimings {
    pub retrieval: String,
    pub history: String,
    pub prompt: String,
    pub llm: String,
    pub save: String,
    pub total: String,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub response: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub chunks_retrieved: usize,
    pub chat_history_length: usize,
    pub timing_breakdown: PredictTimings,
}

/// Answers a query: retrieve, recall history, prompt, complete, persist.
pub struct PredictFlow {
    documents: DocumentStore,
    retriever: Arc<Retriever>,
    chat: Arc<dyn ChatProvider>,
    top_k: usize,
    history_turns: usize,
}

impl PredictFlow {
    pub fn new(
        documents: DocumentStore,
        retriever: Arc<Retriever>,
        chat: Arc<dyn ChatProvider>,
        top_k: usize,
        history_turns: usize,
    ) -> Self {
        Self {
            documents,
            retriever,
            chat,
            top_k,
            history_turns,
        }
    }

    pub async fn predict(
        &self,
        query: &str,
        session_id: &str,
        user_id: &str,
    ) -> Result<PredictResponse, PredictError> {
        let started = Instant::now();
        tracing::info!(
            user_id,
            session_id,
            query_len = query.chars().count(),
            "Starting prediction flow"
        );
        tracing::debug!(query = %preview(query, 100), "Query preview");

        let retrieval_start = Instant::now();
        let context = self
            .retriever
            .retrieve_similar_chunks(query, self.top_k, Some(user_id))
            .await?;
        let retrieval = retrieval_start.elapsed();

        let history_start = Instant::now();
        let history = self
            .documents
            .chat_history(session_id, self.history_turns)
            .await
            .map_err(PredictError::History)?;
        let history_time = history_start.elapsed();

        let prompt_start = Instant::now();
        let prompt = render_context_prompt(&history, &context, query);
        let prompt_time = prompt_start.elapsed();
        tracing::debug!(prompt_len = prompt.chars().count(), "System prompt created");

        let llm_start = Instant::now();
        let completion = self.chat.chat(ChatRequest::from_prompt(prompt)).await?;
        let llm = llm_start.elapsed();
        tracing::info!(
            provider = self.chat.name(),
            model = %completion.model,
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            elapsed = %format_secs(llm),
            "LLM response received"
        );

        let save_start = Instant::now();
        self.documents
            .save_chat_turn(user_id, session_id, query, &completion.content)
            .await
            .map_err(PredictError::History)?;
        let save = save_start.elapsed();

        let total = started.elapsed();
        tracing::info!(user_id, session_id, elapsed = %format_secs(total), "Prediction flow completed");

        Ok(PredictResponse {
            response: completion.content,
            model: completion.model,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            chunks_retrieved: context.len(),
            chat_history_length: history.len(),
            timing_breakdown: PredictTimings {
                retrieval: format_secs(retrieval),
                history: format_secs(history_time),
                prompt: format_secs(prompt_time),
                llm: format_secs(llm),
                save: format_secs(save),
                total: format_secs(total),
            },
        })
    }
}
