use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::embedding::build_embedder;
use crate::llm::{GeminiGenerator, Generator};
use crate::rag::{RagOptions, RagService, SqliteChunkStore};

pub mod error;

use error::InitializationError;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub rag: Arc<RagService>,
}

impl AppState {
    /// Loads settings and wires the store, embedder and generator.
    ///
    /// Missing project or table settings do not fail startup; they are
    /// reported per request.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = Arc::new(
            config
                .load_settings()
                .map_err(|e| InitializationError::Config(e.into()))?,
        );

        let store = SqliteChunkStore::from_settings(&settings.store, paths.as_ref())
            .await
            .map_err(|e| InitializationError::Store(e.into()))?;
        tracing::info!("Chunk store opened at {}", store.db_path().display());

        let embedder = build_embedder(&settings, paths.as_ref())
            .map_err(|e| InitializationError::Embedder(e.into()))?;

        let generator = GeminiGenerator::from_settings(&settings)
            .map_err(|e| InitializationError::Generator(e.into()))?;
        tracing::info!(
            "Embedding with {}, generating with {}",
            embedder.model_name(),
            generator.model_name()
        );

        let rag = Arc::new(RagService::new(
            embedder,
            Arc::new(store),
            Arc::new(generator),
            RagOptions::from(&*settings),
        ));

        Ok(Self::from_parts(settings, rag))
    }

    pub fn from_parts(settings: Arc<Settings>, rag: Arc<RagService>) -> Arc<Self> {
        Arc::new(AppState { settings, rag })
    }
}
