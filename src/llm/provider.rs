use async_trait::async_trait;

use crate::core::config::GenerationSettings;
use crate::core::errors::ApiError;

/// Sampling parameters for a single completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&GenerationSettings> for GenerationParams {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            max_output_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        (&GenerationSettings::default()).into()
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// return the model identifier (e.g. "gemini-2.5-flash-lite")
    fn model_name(&self) -> &str;

    /// single completion, no retries
    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String, ApiError>;
}
