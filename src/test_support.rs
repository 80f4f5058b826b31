//! In-memory collaborators shared by unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::errors::ApiError;
use crate::embedding::{EmbedRole, Embedder};
use crate::llm::{GenerationParams, Generator};
use crate::rag::store::{ChunkRecord, RetrievalHit, VectorStore};

/// Returns the same vector for every text and remembers the roles it saw.
pub struct FixedEmbedder {
    pub vector: Vec<f32>,
    pub roles: Mutex<Vec<EmbedRole>>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            roles: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn embed(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>, ApiError> {
        self.roles.lock().unwrap().push(role);
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<Vec<ChunkRecord>>,
}

impl MemoryStore {
    pub fn with_records(records: Vec<ChunkRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalHit>, ApiError> {
        let records = self.records.lock().unwrap();
        let mut hits: Vec<RetrievalHit> = records
            .iter()
            .map(|r| RetrievalHit {
                id: r.id.clone(),
                title: r.title.clone(),
                chunk_text: r.chunk_text.clone(),
                score: r.embedding.iter().zip(query).map(|(a, b)| a * b).sum(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn replace_all(
        &self,
        records: Vec<ChunkRecord>,
        _embedding_model: &str,
    ) -> Result<usize, ApiError> {
        let count = records.len();
        *self.records.lock().unwrap() = records;
        Ok(count)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        Ok(self.records.lock().unwrap().len())
    }

    async fn embedding_dim(&self) -> Result<Option<usize>, ApiError> {
        Ok(self.records.lock().unwrap().first().map(|r| r.embedding.len()))
    }
}

/// Replies with a canned answer, optionally after a delay or with an error.
pub struct ScriptedGenerator {
    pub reply: Result<String, String>,
    pub delay: Duration,
    pub prompts: Mutex<Vec<String>>,
    /// Set once a reply has been produced.
    pub finished: AtomicBool,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _params: GenerationParams) -> Result<String, ApiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.finished.store(true, Ordering::SeqCst);
        self.reply.clone().map_err(ApiError::Upstream)
    }
}

pub fn record(doc_id: &str, index: u32, title: &str, text: &str, embedding: Vec<f32>) -> ChunkRecord {
    ChunkRecord {
        id: ChunkRecord::chunk_id(doc_id, index),
        doc_id: doc_id.to_string(),
        title: title.to_string(),
        chunk_index: index,
        chunk_text: text.to_string(),
        embedding,
    }
}
