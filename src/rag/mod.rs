//! Retrieval-augmented generation building blocks.
//!
//! - `chunker`: recursive character splitting of extracted text
//! - `extract`: text extraction from uploaded files
//! - `store` / `sqlite`: per-document chunk storage with cosine search
//! - `vector`: embedding blobs and similarity
//! - `retriever`: embedding, storage and similarity retrieval

pub mod chunker;
pub mod extract;
pub mod retriever;
pub mod sqlite;
pub mod store;
pub mod vector;

pub use chunker::RecursiveChunker;
pub use extract::{extract_text, ExtractError};
pub use retriever::{DocumentRef, RetrievalError, Retriever};
pub use sqlite::SqliteRagStore;
pub use store::{ChunkSearchResult, RagStore, StoredChunk};
