//! Typed view over the merged YAML configuration.
//!
//! Every field has a default so an empty `config.yml` still yields a usable
//! configuration; only the client secret must be supplied.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub history: HistoryConfig,
    pub evaluation: EvaluationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for multipart uploads on `/train`.
    pub max_upload_bytes: usize,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 25 * 1024 * 1024,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Full endpoint URL, not a base.
    pub url: String,
    /// Falls back to `llm.api_key` when empty.
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://api.cohere.ai/v1/rerank".to_string(),
            api_key: String::new(),
            model: "rerank-english-v2.0".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Candidates fetched before reranking; ignored without a reranker.
    pub candidate_k: usize,
    pub scope_to_user: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            candidate_k: 20,
            scope_to_user: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub turns: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { turns: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Score the four judge metrics; heuristics always run.
    pub judge_enabled: bool,
    pub top_k: usize,
    /// Questions generated from the answer for `answer_relevancy`.
    pub relevancy_questions: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            judge_enabled: true,
            top_k: 5,
            relevancy_questions: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
        }
    }
}

impl EmbeddingConfig {
    pub fn effective_api_key<'a>(&'a self, llm: &'a LlmConfig) -> &'a str {
        if self.api_key.trim().is_empty() {
            &llm.api_key
        } else {
            &self.api_key
        }
    }
}
