use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::config::RagSettings;
use crate::core::errors::ApiError;
use crate::rag::AnswerResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub k: Option<i64>,
    /// Accepted spelling of `k`; `k` wins when both are sent.
    #[serde(default)]
    pub top_k: Option<i64>,
}

impl ChatRequest {
    /// Returns the trimmed question and the effective `k`.
    fn validate(&self, rag: &RagSettings) -> Result<(String, usize), ApiError> {
        let question = self
            .question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ApiError::BadRequest("question is required".to_string()))?;

        let k = match self.k.or(self.top_k) {
            None => rag.default_top_k,
            Some(k) if k >= 1 && (k as u64) <= rag.max_top_k as u64 => k as usize,
            Some(k) => {
                return Err(ApiError::BadRequest(format!(
                    "k must be between 1 and {} (got {})",
                    rag.max_top_k, k
                )))
            }
        };

        Ok((question.to_string(), k))
    }
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<AnswerResult>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (question, k) = request.validate(&state.settings.rag)?;
    state.settings.require_serving()?;

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id, k);
    async move {
        tracing::info!("Answering question ({} chars)", question.chars().count());
        let result = state.rag.answer(&question, k).await?;
        tracing::info!(
            matches = result.matches.len(),
            citations = result.citations.len(),
            "Answer ready"
        );
        Ok::<_, ApiError>(Json(result))
    }
    .instrument(span)
    .await
}
