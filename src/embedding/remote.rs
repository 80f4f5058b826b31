//! Vertex AI text-embedding client with quota-aware retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{l2_normalize, EmbedRole, Embedder};
use crate::core::config::Settings;
use crate::core::errors::ApiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Exponential backoff for quota errors: `min(base * 2^attempt, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(64),
        }
    }
}

pub struct RemoteEmbedder {
    client: Client,
    predict_url: String,
    project: String,
    access_token: Option<String>,
    model: String,
    batch_size: usize,
    batch_sleep: Duration,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
}

#[derive(Serialize)]
struct PredictInstance<'a> {
    content: &'a str,
    task_type: &'static str,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct Prediction {
    embeddings: PredictionEmbeddings,
}

#[derive(Deserialize)]
struct PredictionEmbeddings {
    values: Vec<f32>,
}

impl RemoteEmbedder {
    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        let embedding = &settings.embedding;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            client,
            predict_url: format!("{}:predict", settings.gcp.model_url(&embedding.remote_model)),
            project: settings.gcp.project.clone(),
            access_token: settings
                .gcp
                .access_token
                .clone()
                .filter(|token| !token.trim().is_empty()),
            model: embedding.remote_model.clone(),
            batch_size: embedding.batch_size.max(1),
            batch_sleep: Duration::from_millis(embedding.batch_sleep_ms),
            retry: RetryPolicy {
                max_retries: embedding.max_retries,
                base: Duration::from_millis(embedding.backoff_base_ms),
                cap: Duration::from_millis(embedding.backoff_cap_ms),
            },
        })
    }

    async fn embed_batch(&self, batch: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>, ApiError> {
        let mut attempt = 0u32;
        loop {
            match self.request_batch(batch, role).await {
                Err(ApiError::QuotaExceeded(message)) => {
                    if attempt >= self.retry.max_retries {
                        return Err(ApiError::QuotaExceeded(format!(
                            "gave up after {} retries: {}",
                            self.retry.max_retries, message
                        )));
                    }
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        "Embedding quota hit (attempt {}); backing off {:?}",
                        attempt + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn request_batch(&self, batch: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>, ApiError> {
        let body = PredictRequest {
            instances: batch
                .iter()
                .map(|text| PredictInstance {
                    content: text,
                    task_type: role.task_type(),
                })
                .collect(),
        };

        let mut request = self.client.post(&self.predict_url).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let res = request.send().await.map_err(ApiError::upstream)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS || text.contains("RESOURCE_EXHAUSTED") {
                return Err(ApiError::QuotaExceeded(format!("{}: {}", status, text)));
            }
            return Err(ApiError::Upstream(format!(
                "embedding request failed ({}): {}",
                status, text
            )));
        }

        let payload: PredictResponse = res.json().await.map_err(ApiError::upstream)?;
        if payload.predictions.len() != batch.len() {
            return Err(ApiError::Upstream(format!(
                "embedding service returned {} vectors for {} texts",
                payload.predictions.len(),
                batch.len()
            )));
        }

        Ok(payload
            .predictions
            .into_iter()
            .map(|prediction| {
                let mut values = prediction.embeddings.values;
                l2_normalize(&mut values);
                values
            })
            .collect())
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if self.project.trim().is_empty() {
            return Err(ApiError::Misconfigured("GCP_PROJECT missing".to_string()));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        let mut batches = texts.chunks(self.batch_size).peekable();
        while let Some(batch) = batches.next() {
            vectors.extend(self.embed_batch(batch, role).await?);
            // Soft throttle between calls; nothing to wait for after the last one.
            if batches.peek().is_some() && !self.batch_sleep.is_zero() {
                tokio::time::sleep(self.batch_sleep).await;
            }
        }
        Ok(vectors)
    }
}
