use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths};
use crate::core::security::ClientSecret;
use crate::evaluation::{EvaluationService, LlmJudge, RagasEvaluator};
use crate::history::DocumentStore;
use crate::llm::{
    ChatProvider, EmbeddingProvider, HttpReranker, OpenAiChatClient, OpenAiEmbeddingClient,
    Reranker,
};
use crate::pipeline::{PredictFlow, TrainFlow};
use crate::rag::{RagStore, RecursiveChunker, Retriever, SqliteRagStore};

pub mod error;

use error::InitializationError;

/// Shared state handed to every route.
///
/// The flows hold clones of the document store and the retriever; the
/// struct itself is shared behind an `Arc`.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub client_secret: ClientSecret,
    pub documents: DocumentStore,
    pub rag_store: Arc<dyn RagStore>,
    pub retriever: Arc<Retriever>,
    pub train: TrainFlow,
    pub predict: PredictFlow,
    pub evaluation: EvaluationService,
}

impl AppState {
    /// Builds the HTTP clients named in `config` and wires them into the flows.
    pub async fn initialize(
        paths: Arc<AppPaths>,
        config: AppConfig,
    ) -> Result<Arc<Self>, InitializationError> {
        let chat: Arc<dyn ChatProvider> = Arc::new(
            OpenAiChatClient::new(&config.llm).map_err(|e| InitializationError::Llm(e.into()))?,
        );
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(
            OpenAiEmbeddingClient::new(&config.embedding, &config.llm)
                .map_err(|e| InitializationError::Embedding(e.into()))?,
        );
        let reranker: Option<Arc<dyn Reranker>> = if config.reranker.enabled {
            let client = HttpReranker::new(&config.reranker)
                .map_err(|e| InitializationError::Reranker(e.into()))?;
            Some(Arc::new(client))
        } else {
            None
        };

        let rag_store: Arc<dyn RagStore> = Arc::new(
            SqliteRagStore::new(paths.as_ref())
                .await
                .map_err(|e| InitializationError::Rag(e.into()))?,
        );

        match rag_store.count(None).await {
            Ok(chunks) => tracing::info!(chunks, "RAG store ready"),
            Err(err) => tracing::warn!("Failed to count stored chunks: {}", err),
        }

        tracing::info!(
            provider = %chat.name(),
            embedding_model = %embedder.model(),
            reranker = reranker.is_some(),
            judge = config.evaluation.judge_enabled,
            "Providers configured"
        );

        Self::from_parts(paths, config, rag_store, chat, embedder, reranker).await
    }

    /// Wires already-built providers into the flows. Tests call this with mocks.
    pub async fn from_parts(
        paths: Arc<AppPaths>,
        config: AppConfig,
        rag_store: Arc<dyn RagStore>,
        chat: Arc<dyn ChatProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Result<Arc<Self>, InitializationError> {
        let documents = DocumentStore::new(paths.db_path.clone())
            .await
            .map_err(|e| InitializationError::Documents(e.into()))?;

        let retriever = Arc::new(Retriever::new(
            rag_store.clone(),
            embedder.clone(),
            reranker,
            &config.retrieval,
        ));

        let train = TrainFlow::new(
            documents.clone(),
            retriever.clone(),
            RecursiveChunker::from_config(&config.chunking),
        );
        let predict = PredictFlow::new(
            documents.clone(),
            retriever.clone(),
            chat.clone(),
            config.retrieval.top_k,
            config.history.turns,
        );

        let judge = config.evaluation.judge_enabled.then(|| {
            LlmJudge::new(
                chat.clone(),
                embedder.clone(),
                config.evaluation.relevancy_questions,
            )
        });
        let evaluation = EvaluationService::new(
            documents.clone(),
            retriever.clone(),
            chat,
            RagasEvaluator::new(judge),
            config.evaluation.top_k,
            config.history.turns,
            paths.export_dir.clone(),
        );

        let client_secret = ClientSecret::new(config.auth.client_secret.clone());

        Ok(Arc::new(AppState {
            paths,
            config,
            client_secret,
            documents,
            rag_store,
            retriever,
            train,
            predict,
            evaluation,
        }))
    }
}
