//! Retrieval-augmented answering over embedded paper chunks.
//!
//! - `chunker`: word-window splitting of abstracts
//! - `store` / `sqlite`: chunk storage and exact top-k search
//! - `prompt`: grounded prompt assembly
//! - `service`: the `RagService` orchestrator

pub mod chunker;
pub mod prompt;
pub mod service;
pub mod sqlite;
pub mod store;

pub use chunker::chunk_text;
pub use prompt::build_prompt;
pub use service::{AnswerResult, RagOptions, RagService};
pub use sqlite::SqliteChunkStore;
pub use store::{ChunkRecord, RetrievalHit, VectorStore};
