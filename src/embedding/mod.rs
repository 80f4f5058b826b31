//! Text embedding capability.
//!
//! Two interchangeable backends sit behind [`Embedder`]: an in-process
//! sentence encoder ([`LocalEmbedder`]) and the hosted Vertex AI embedding
//! API ([`RemoteEmbedder`]). Both return one unit-length vector per input,
//! in input order.

pub mod local;
pub mod onnx;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::{AppPaths, EmbeddingProvider, Settings};
use crate::core::errors::ApiError;

pub use local::{LocalEmbedder, SentenceEncoder};
pub use onnx::OnnxSentenceEncoder;
pub use remote::{RemoteEmbedder, RetryPolicy};

/// Which side of an asymmetric retrieval pair a text is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedRole {
    Query,
    Passage,
}

impl EmbedRole {
    /// Prefix the local e5-style encoders were trained with.
    pub fn prefix(self) -> &'static str {
        match self {
            EmbedRole::Query => "query: ",
            EmbedRole::Passage => "passage: ",
        }
    }

    /// Vertex AI `task_type` for the same role.
    pub fn task_type(self) -> &'static str {
        match self {
            EmbedRole::Query => "RETRIEVAL_QUERY",
            EmbedRole::Passage => "RETRIEVAL_DOCUMENT",
        }
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded alongside stored vectors.
    fn model_name(&self) -> &str;

    async fn embed(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// Scales `vector` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

/// Builds the backend selected by `embedding.provider`.
pub fn build_embedder(settings: &Settings, paths: &AppPaths) -> Result<Arc<dyn Embedder>, ApiError> {
    let embedding = &settings.embedding;
    match embedding.provider {
        EmbeddingProvider::Local => {
            let model_dir = match embedding.model_dir.as_deref().map(str::trim) {
                Some(dir) if !dir.is_empty() => paths.resolve(dir),
                _ => paths.models_dir.join(&embedding.local_model),
            };
            tracing::info!(
                "Using local embedding model {} from {}",
                embedding.local_model,
                model_dir.display()
            );
            let encoder = OnnxSentenceEncoder::new(model_dir, embedding.max_sequence_length);
            Ok(Arc::new(LocalEmbedder::new(
                Arc::new(encoder),
                embedding.local_model.clone(),
            )))
        }
        EmbeddingProvider::Remote => {
            tracing::info!("Using Vertex AI embedding model {}", embedding.remote_model);
            Ok(Arc::new(RemoteEmbedder::from_settings(settings)?))
        }
    }
}
