//! Retrieval-and-answer orchestration.
//!
//! embed (query role) -> search -> prompt -> generate -> assemble. Steps run
//! strictly in sequence; any failure ends the request with no partial answer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;

use super::prompt::build_prompt;
use super::store::{RetrievalHit, VectorStore};
use crate::core::config::Settings;
use crate::core::errors::ApiError;
use crate::embedding::{EmbedRole, Embedder};
use crate::llm::{GenerationParams, Generator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RagOptions {
    pub max_context_chunks: usize,
    pub max_chunk_chars: usize,
    pub generation: GenerationParams,
    pub generation_timeout: Duration,
}

impl From<&Settings> for RagOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            max_context_chunks: settings.rag.max_context_chunks,
            max_chunk_chars: settings.rag.max_chunk_chars,
            generation: (&settings.generation).into(),
            generation_timeout: settings.generation.timeout(),
        }
    }
}

impl Default for RagOptions {
    fn default() -> Self {
        (&Settings::default()).into()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    /// Titles of the matches, in order. Duplicates are kept.
    pub citations: Vec<String>,
    pub matches: Vec<RetrievalHit>,
}

/// Aborts the spawned generation when the awaiting request goes away.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct RagService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    options: RagOptions,
}

impl RagService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        options: RagOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            options,
        }
    }

    pub async fn answer(&self, question: &str, k: usize) -> Result<AnswerResult, ApiError> {
        let started = Instant::now();

        let query = self.embed_query(question).await?;
        tracing::debug!("Embedded query in {:?}", started.elapsed());

        let mut matches = self.store.search(&query, k).await?;
        matches.truncate(k);
        tracing::debug!("Retrieved {} chunks in {:?}", matches.len(), started.elapsed());

        let prompt = build_prompt(
            question,
            &matches,
            self.options.max_context_chunks,
            self.options.max_chunk_chars,
        );
        let answer = self.generate(prompt).await?;
        tracing::debug!("Generated answer in {:?}", started.elapsed());

        let citations = matches
            .iter()
            .filter(|hit| !hit.title.trim().is_empty())
            .map(|hit| hit.title.clone())
            .collect();

        Ok(AnswerResult {
            answer,
            citations,
            matches,
        })
    }

    async fn embed_query(&self, question: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self
            .embedder
            .embed(&[question.to_string()], EmbedRole::Query)
            .await?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => Ok(vector),
            _ => Err(ApiError::Internal(
                "embedder did not return exactly one query vector".to_string(),
            )),
        }
    }

    /// Runs the model call on its own task so request handling never waits on it
    /// inline, bounded by `generation_timeout`. Dropping the request cancels it.
    async fn generate(&self, prompt: String) -> Result<String, ApiError> {
        let generator = Arc::clone(&self.generator);
        let params = self.options.generation;

        let handle = tokio::spawn(async move { generator.generate(&prompt, params).await });
        let _guard = AbortOnDrop(handle.abort_handle());

        match tokio::time::timeout(self.options.generation_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ApiError::Internal(format!(
                "generation task failed: {}",
                join_error
            ))),
            Err(_) => Err(ApiError::Timeout(format!(
                "generation did not finish within {:?}",
                self.options.generation_timeout
            ))),
        }
    }
}
