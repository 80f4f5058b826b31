use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use paper_rag::core::config::Settings;
use paper_rag::core::errors::ApiError;
use paper_rag::embedding::{EmbedRole, Embedder};
use paper_rag::ingest::{IngestOptions, IngestPipeline};
use paper_rag::llm::{GenerationParams, Generator};
use paper_rag::rag::{ChunkRecord, RagOptions, RagService, SqliteChunkStore, VectorStore};
use paper_rag::server::router::router;
use paper_rag::state::AppState;

struct UnitEmbedder;

#[async_trait]
impl Embedder for UnitEmbedder {
    fn model_name(&self) -> &str {
        "unit"
    }

    async fn embed(&self, texts: &[String], _role: EmbedRole) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

#[derive(Default)]
struct StubGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Generator for StubGenerator {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, prompt: &str, _params: GenerationParams) -> Result<String, ApiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Synthesis text [Paper X]".to_string())
    }
}

async fn open_store(dir: &std::path::Path) -> Arc<SqliteChunkStore> {
    Arc::new(
        SqliteChunkStore::with_path(dir.join("paper_rag.db"), "paper_chunks")
            .await
            .unwrap(),
    )
}

fn state_for(
    store: Arc<SqliteChunkStore>,
    generator: Arc<StubGenerator>,
) -> Arc<AppState> {
    let mut settings = Settings::default();
    settings.gcp.project = "demo-project".to_string();
    let rag = RagService::new(
        Arc::new(UnitEmbedder),
        store,
        generator,
        RagOptions::from(&settings),
    );
    AppState::from_parts(Arc::new(settings), Arc::new(rag))
}

async fn ask(state: Arc<AppState>, body: &str) -> (StatusCode, Value) {
    let response = router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn single_chunk_round_trip_through_http() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path()).await;
    store
        .replace_all(
            vec![ChunkRecord {
                id: "p1#0".to_string(),
                doc_id: "p1".to_string(),
                title: "Paper X".to_string(),
                chunk_index: 0,
                chunk_text: "Self-attention replaces recurrence.".to_string(),
                embedding: vec![1.0, 0.0],
            }],
            "unit",
        )
        .await
        .unwrap();

    let hits = store.search(&[1.0, 0.0], 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!((hits[0].score - 1.0).abs() < 1e-6);

    let generator = Arc::new(StubGenerator::default());
    let state = state_for(store, generator.clone());
    let (status, body) = ask(state, r#"{"question": "What replaces recurrence?", "k": 1}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Synthesis text [Paper X]");
    assert_eq!(body["citations"], serde_json::json!(["Paper X"]));
    assert_eq!(body["matches"][0]["id"], "p1#0");
    assert!((body["matches"][0]["score"].as_f64().unwrap() - 1.0).abs() < 1e-6);

    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts[0].contains("TITLE: Paper X"));
}

#[tokio::test]
async fn ingested_corpus_is_searchable() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("raw.jsonl");
    std::fs::write(
        &input,
        concat!(
            r#"{"id":"p1","title":"Paper X","abstract":"one two three","update_date":"2024-01-01"}"#, "\n",
            r#"{"id":"p1","title":"Paper X v2","abstract":"one two three four five","update_date":"2024-06-01"}"#, "\n",
            r#"{"id":"p2","title":"Paper Y","abstract":"","update_date":"2024-06-01"}"#, "\n",
        ),
    )
    .unwrap();

    let store = open_store(tmp.path()).await;
    let pipeline = IngestPipeline::new(
        Arc::new(UnitEmbedder),
        store.clone(),
        IngestOptions {
            max_words: 2,
            batch_size: 16,
            limit: None,
            show_progress: false,
        },
    );
    let report = pipeline.run(&input, None).await.unwrap();

    assert_eq!(report.records_read, 3);
    assert_eq!(report.records_kept, 1);
    assert_eq!(report.chunks_written, 3);
    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(store.embedding_dim().await.unwrap(), Some(2));

    let state = state_for(store, Arc::new(StubGenerator::default()));
    let (status, body) = ask(state, r#"{"question": "q", "top_k": 10}"#).await;

    assert_eq!(status, StatusCode::OK);
    let matches = body["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 3);
    assert!(matches.iter().all(|m| m["title"] == "Paper X v2"));
    assert_eq!(body["citations"].as_array().unwrap().len(), 3);
}
