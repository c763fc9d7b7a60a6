pub mod error;
pub mod openai;
pub mod provider;
pub mod reranker;
pub mod types;

pub use error::LlmError;
pub use openai::{OpenAiChatClient, OpenAiEmbeddingClient};
pub use provider::{ChatProvider, EmbeddingProvider, Reranker};
pub use reranker::HttpReranker;
pub use types::{ChatCompletion, ChatMessage, ChatRequest};
