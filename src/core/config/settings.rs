//! Typed view over the merged configuration document.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::is_valid_table_name;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gcp: GcpSettings,
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub rag: RagSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpSettings {
    pub project: String,
    pub location: String,
    /// OAuth bearer token for Vertex AI calls.
    pub access_token: Option<String>,
    /// Overrides `https://{location}-aiplatform.googleapis.com`.
    pub api_endpoint: Option<String>,
}

impl Default for GcpSettings {
    fn default() -> Self {
        Self {
            project: String::new(),
            location: "us-central1".to_string(),
            access_token: None,
            api_endpoint: None,
        }
    }
}

impl GcpSettings {
    pub fn endpoint(&self) -> String {
        match self.api_endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_string(),
            _ => format!("https://{}-aiplatform.googleapis.com", self.location),
        }
    }

    /// Base URL of a publisher model, e.g. `.../publishers/google/models/gemini-2.5-flash-lite`.
    pub fn model_url(&self, model: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}",
            self.endpoint(),
            self.project,
            self.location,
            model
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite file; relative paths resolve under the data dir.
    pub db_path: Option<String>,
    pub table: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: None,
            table: "paper_chunks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub local_model: String,
    /// Directory holding `model.onnx` and `tokenizer.json`; defaults to `models/<local_model>`.
    pub model_dir: Option<String>,
    pub max_sequence_length: usize,
    pub remote_model: String,
    pub batch_size: usize,
    pub batch_sleep_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            local_model: "intfloat/e5-small-v2".to_string(),
            model_dir: None,
            max_sequence_length: 512,
            remote_model: "text-embedding-004".to_string(),
            batch_size: 16,
            batch_sleep_ms: 1_500,
            max_retries: 6,
            backoff_base_ms: 2_000,
            backoff_cap_ms: 64_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-lite".to_string(),
            max_output_tokens: 1024,
            temperature: 0.2,
            top_p: 0.95,
            timeout_secs: 120,
        }
    }
}

impl GenerationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub max_context_chunks: usize,
    pub max_chunk_chars: usize,
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub chunk_max_words: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            max_context_chunks: 5,
            max_chunk_chars: 1200,
            default_top_k: 5,
            max_top_k: 100,
            chunk_max_words: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Settings {
    /// Checked per request: the service can boot without these, but cannot answer.
    pub fn require_serving(&self) -> Result<(), ApiError> {
        let mut missing = Vec::new();
        if self.gcp.project.trim().is_empty() {
            missing.push("GCP_PROJECT");
        }
        if self.store.table.trim().is_empty() {
            missing.push("STORE_TABLE");
        }
        if !missing.is_empty() {
            return Err(ApiError::Misconfigured(format!(
                "{} missing",
                missing.join(" / ")
            )));
        }
        let table = self.store.table.trim();
        if !is_valid_table_name(table) {
            return Err(ApiError::Misconfigured(format!(
                "STORE_TABLE '{}' is not a plain SQL identifier",
                table
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.rag.max_context_chunks, 5);
        assert_eq!(settings.rag.max_chunk_chars, 1200);
        assert_eq!(settings.gcp.location, "us-central1");
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Local);
        assert_eq!(settings.generation.model, "gemini-2.5-flash-lite");
    }

    #[test]
    fn require_serving_reports_missing_project() {
        let settings = Settings::default();
        let err = settings.require_serving().unwrap_err();
        assert!(matches!(err, ApiError::Misconfigured(ref msg) if msg.contains("GCP_PROJECT")));

        let mut configured = Settings::default();
        configured.gcp.project = "demo-project".to_string();
        assert!(configured.require_serving().is_ok());
    }

    #[test]
    fn require_serving_rejects_unusable_table_names() {
        let mut settings = Settings::default();
        settings.gcp.project = "demo-project".to_string();
        settings.store.table = "chunks; DROP TABLE x".to_string();

        let err = settings.require_serving().unwrap_err();
        assert!(matches!(err, ApiError::Misconfigured(ref msg) if msg.contains("STORE_TABLE")));
    }

    #[test]
    fn model_url_uses_regional_endpoint_unless_overridden() {
        let mut gcp = GcpSettings {
            project: "p1".to_string(),
            ..GcpSettings::default()
        };
        assert_eq!(
            gcp.model_url("text-embedding-004"),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/p1/locations/us-central1/publishers/google/models/text-embedding-004"
        );

        gcp.api_endpoint = Some("http://127.0.0.1:9000/".to_string());
        assert!(gcp.model_url("m").starts_with("http://127.0.0.1:9000/v1/projects/p1"));
    }
}
