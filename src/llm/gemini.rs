use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::provider::{GenerationParams, Generator};
use super::types::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, RequestPart};
use crate::core::config::Settings;
use crate::core::errors::ApiError;

/// Vertex AI Gemini client. One HTTP call per prompt.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    url: String,
    access_token: Option<String>,
    model: String,
}

impl GeminiGenerator {
    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        let model = settings.generation.model.clone();
        // The orchestrator enforces the real deadline; this only bounds stuck sockets.
        let client = Client::builder()
            .timeout(settings.generation.timeout() + Duration::from_secs(5))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            client,
            url: format!("{}:generateContent", settings.gcp.model_url(&model)),
            access_token: settings
                .gcp
                .access_token
                .clone()
                .filter(|token| !token.trim().is_empty()),
            model,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String, ApiError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: params.max_output_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
            },
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let res = request.send().await.map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "Gemini generateContent error ({}): {}",
                status, text
            )));
        }

        let payload: GenerateContentResponse = res.json().await.map_err(ApiError::upstream)?;
        payload.first_text().ok_or_else(|| {
            ApiError::Upstream(format!(
                "Gemini returned no text (finish reason: {})",
                payload.finish_reason().unwrap_or("unknown")
            ))
        })
    }
}
