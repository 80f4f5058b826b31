use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use super::clean::{clean_corpus, CleanRecord, RawRecord};
use super::jsonl::{read_jsonl, write_jsonl};
use crate::core::config::Settings;
use crate::core::errors::ApiError;
use crate::embedding::{EmbedRole, Embedder};
use crate::rag::chunker::chunk_text;
use crate::rag::store::{ChunkRecord, VectorStore};

#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    pub max_words: usize,
    pub batch_size: usize,
    pub limit: Option<usize>,
    pub show_progress: bool,
}

impl From<&Settings> for IngestOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            max_words: settings.rag.chunk_max_words,
            batch_size: settings.embedding.batch_size,
            limit: None,
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub records_read: usize,
    pub records_kept: usize,
    pub chunks_written: usize,
}

pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    options: IngestOptions,
}

impl IngestPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, options: IngestOptions) -> Self {
        Self {
            embedder,
            store,
            options,
        }
    }

    /// raw JSONL -> store, optionally writing the cleaned corpus alongside.
    pub async fn run(&self, input: &Path, cleaned_output: Option<&Path>) -> Result<IngestReport, ApiError> {
        let started = Instant::now();
        let raw: Vec<RawRecord> = read_jsonl(input, self.options.limit)?;
        let records_read = raw.len();
        let records = clean_corpus(raw);
        tracing::info!(
            "Read {} records from {}, kept {} after cleaning",
            records_read,
            input.display(),
            records.len()
        );

        if let Some(path) = cleaned_output {
            write_jsonl(path, &records)?;
            tracing::info!("Wrote cleaned corpus to {}", path.display());
        }

        let mut report = self.load(records).await?;
        report.records_read = records_read;
        tracing::info!(
            "Ingested {} chunks in {:.1?}",
            report.chunks_written,
            started.elapsed()
        );
        Ok(report)
    }

    /// Chunks, embeds and replaces the store contents with `records`.
    pub async fn load(&self, records: Vec<CleanRecord>) -> Result<IngestReport, ApiError> {
        let chunks = self.build_chunks(&records).await?;
        let written = self
            .store
            .replace_all(chunks, self.embedder.model_name())
            .await?;

        Ok(IngestReport {
            records_read: records.len(),
            records_kept: records.len(),
            chunks_written: written,
        })
    }

    async fn build_chunks(&self, records: &[CleanRecord]) -> Result<Vec<ChunkRecord>, ApiError> {
        let progress = self.progress_bar(records.len());
        let batch_size = self.options.batch_size.max(1);
        let mut out = Vec::new();

        for record in records {
            let pieces = chunk_text(&record.abstract_text, self.options.max_words);
            for (batch_index, batch) in pieces.chunks(batch_size).enumerate() {
                let vectors = self.embedder.embed(batch, EmbedRole::Passage).await?;
                if vectors.len() != batch.len() {
                    return Err(ApiError::Upstream(format!(
                        "embedder returned {} vectors for {} chunks",
                        vectors.len(),
                        batch.len()
                    )));
                }

                for (offset, (text, embedding)) in batch.iter().zip(vectors).enumerate() {
                    let chunk_index = (batch_index * batch_size + offset) as u32;
                    out.push(ChunkRecord {
                        id: ChunkRecord::chunk_id(&record.id, chunk_index),
                        doc_id: record.id.clone(),
                        title: record.title.clone(),
                        chunk_index,
                        chunk_text: text.clone(),
                        embedding,
                    });
                }
            }
            progress.inc(1);
            progress.set_message(out.len().to_string());
        }

        progress.finish_and_clear();
        Ok(out)
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} papers | chunks: {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FixedEmbedder, MemoryStore};

    fn options(max_words: usize, batch_size: usize) -> IngestOptions {
        IngestOptions {
            max_words,
            batch_size,
            limit: None,
            show_progress: false,
        }
    }

    fn clean(id: &str, title: &str, abstract_text: &str) -> CleanRecord {
        CleanRecord {
            id: id.to_string(),
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
            categories: String::new(),
            update_date: "2024-01-01".to_string(),
        }
    }

    #[tokio::test]
    async fn chunk_ids_follow_doc_and_index() {
        let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
        let store = Arc::new(MemoryStore::default());
        let pipeline = IngestPipeline::new(embedder.clone(), store.clone(), options(2, 2));

        let report = pipeline
            .load(vec![clean("p1", "Paper X", "a b c d e"), clean("p2", "Paper Y", "f")])
            .await
            .unwrap();

        assert_eq!(report.chunks_written, 4);
        let records = store.records.lock().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p1#0", "p1#1", "p1#2", "p2#0"]);
        assert_eq!(records[2].chunk_text, "e");
        assert_eq!(records[2].chunk_index, 2);
        assert_eq!(records[3].title, "Paper Y");
        assert!(embedder
            .roles
            .lock()
            .unwrap()
            .iter()
            .all(|role| *role == EmbedRole::Passage));
    }

    #[tokio::test]
    async fn run_cleans_dedupes_and_writes_the_corpus() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("raw.jsonl");
        let cleaned = tmp.path().join("clean.jsonl");
        std::fs::write(
            &input,
            concat!(
                r#"{"id":"p1","title":"Old","abstract":"old text","update_date":"2024-01-01"}"#, "\n",
                r#"{"id":"p2","title":"Empty","abstract":"   ","update_date":"2024-01-01"}"#, "\n",
                r#"{"id":"p1","title":"New","abstract":"new  text","update_date":"2024-06-01"}"#, "\n",
            ),
        )
        .unwrap();

        let store = Arc::new(MemoryStore::default());
        let pipeline = IngestPipeline::new(
            Arc::new(FixedEmbedder::new(vec![0.0, 1.0])),
            store.clone(),
            options(180, 16),
        );
        let report = pipeline.run(&input, Some(cleaned.as_path())).await.unwrap();

        assert_eq!(
            report,
            IngestReport {
                records_read: 3,
                records_kept: 1,
                chunks_written: 1,
            }
        );
        let records = store.records.lock().unwrap();
        assert_eq!(records[0].title, "New");
        assert_eq!(records[0].chunk_text, "new text");

        let written: Vec<CleanRecord> = read_jsonl(&cleaned, None).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].update_date, "2024-06-01");
    }
}
