use std::sync::Arc;

use async_trait::async_trait;

use super::{l2_normalize, EmbedRole, Embedder};
use crate::core::errors::ApiError;

/// Blocking text encoder producing one raw (unnormalized) vector per input.
pub trait SentenceEncoder: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// In-process embedder. Prepends the role prefix, encodes on the blocking
/// pool and L2-normalizes the result.
pub struct LocalEmbedder {
    encoder: Arc<dyn SentenceEncoder>,
    model_name: String,
}

impl LocalEmbedder {
    pub fn new(encoder: Arc<dyn SentenceEncoder>, model_name: impl Into<String>) -> Self {
        Self {
            encoder,
            model_name: model_name.into(),
        }
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = texts
            .iter()
            .map(|text| format!("{}{}", role.prefix(), text))
            .collect();
        let encoder = Arc::clone(&self.encoder);

        let mut vectors = tokio::task::spawn_blocking(move || encoder.encode(&prefixed))
            .await
            .map_err(ApiError::internal)??;

        if vectors.len() != texts.len() {
            return Err(ApiError::Internal(format!(
                "encoder returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        vectors.iter_mut().for_each(|v| l2_normalize(v));
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Deterministic toy encoder: byte histogram folded into 8 buckets.
    #[derive(Default)]
    struct ByteHistogramEncoder {
        seen: Mutex<Vec<String>>,
    }

    impl SentenceEncoder for ByteHistogramEncoder {
        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            self.seen.lock().unwrap().extend(texts.iter().cloned());
            Ok(texts
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; 8];
                    for (i, b) in text.bytes().enumerate() {
                        v[(b as usize + i) % 8] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn query_and_passage_roles_encode_differently() {
        let encoder = Arc::new(ByteHistogramEncoder::default());
        let embedder = LocalEmbedder::new(encoder.clone(), "toy");
        let text = vec!["sparse attention for long documents".to_string()];

        let query = embedder.embed(&text, EmbedRole::Query).await.unwrap();
        let passage = embedder.embed(&text, EmbedRole::Passage).await.unwrap();

        assert_ne!(query, passage);
        let seen = encoder.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "query: sparse attention for long documents".to_string(),
                "passage: sparse attention for long documents".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn outputs_are_unit_length_and_ordered() {
        let embedder = LocalEmbedder::new(Arc::new(ByteHistogramEncoder::default()), "toy");
        let texts = vec!["first".to_string(), "second text".to_string()];

        let vectors = embedder.embed(&texts, EmbedRole::Passage).await.unwrap();
        assert_eq!(vectors.len(), 2);
        for v in &vectors {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }

        let again = embedder
            .embed(&texts[1..].to_vec(), EmbedRole::Passage)
            .await
            .unwrap();
        assert_eq!(again[0], vectors[1]);
    }

    #[tokio::test]
    async fn empty_input_skips_the_encoder() {
        let encoder = Arc::new(ByteHistogramEncoder::default());
        let embedder = LocalEmbedder::new(encoder.clone(), "toy");

        assert!(embedder.embed(&[], EmbedRole::Query).await.unwrap().is_empty());
        assert!(encoder.seen.lock().unwrap().is_empty());
    }
}
