//! VectorStore trait — abstract interface over the chunk store.
//!
//! Serving only reads from the store; the ingestion pipeline replaces its
//! contents wholesale. The primary implementation is `SqliteChunkStore`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// One embedded slice of a paper abstract. Identity is `id` (`<doc_id>#<chunk_index>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub doc_id: String,
    pub title: String,
    pub chunk_index: u32,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    pub fn chunk_id(doc_id: &str, chunk_index: u32) -> String {
        format!("{}#{}", doc_id, chunk_index)
    }
}

/// A ranked search result. `score` is the dot product with the query vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub id: String,
    pub title: String,
    pub chunk_text: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Exhaustive top-k by dot product, highest score first.
    async fn search(&self, query_embedding: &[f32], k: usize)
        -> Result<Vec<RetrievalHit>, ApiError>;

    /// Atomically swaps the stored chunks for `records`.
    async fn replace_all(
        &self,
        records: Vec<ChunkRecord>,
        embedding_model: &str,
    ) -> Result<usize, ApiError>;

    async fn count(&self) -> Result<usize, ApiError>;

    /// Dimension recorded by the last ingestion, if any.
    async fn embedding_dim(&self) -> Result<Option<usize>, ApiError>;
}
