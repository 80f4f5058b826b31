//! Batch ingestion for the paper store.
//!
//! ```bash
//! paper-rag-ingest clean --input arxiv.jsonl --output arxiv_clean.jsonl --limit 5000
//! paper-rag-ingest load --input arxiv_clean.jsonl --provider local
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use paper_rag::core::config::{AppPaths, ConfigService, EmbeddingProvider};
use paper_rag::core::logging;
use paper_rag::embedding::build_embedder;
use paper_rag::ingest::{clean_corpus, read_jsonl, write_jsonl, IngestOptions, IngestPipeline, RawRecord};
use paper_rag::rag::{SqliteChunkStore, VectorStore};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    /// In-process ONNX sentence encoder
    Local,
    /// Vertex AI text-embedding API
    Remote,
}

impl From<ProviderArg> for EmbeddingProvider {
    fn from(value: ProviderArg) -> Self {
        match value {
            ProviderArg::Local => EmbeddingProvider::Local,
            ProviderArg::Remote => EmbeddingProvider::Remote,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "paper-rag-ingest",
    version,
    about = "Clean paper metadata and load embedded chunks into the store"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drop empty abstracts, normalize text and keep the latest version of each paper
    Clean {
        /// Raw JSONL dump (one paper per line)
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Destination for the cleaned JSONL
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Only read the first N lines
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Chunk, embed and replace the store contents
    Load {
        /// Raw or cleaned JSONL
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Also write the cleaned corpus here
        #[arg(long, value_name = "FILE")]
        cleaned_output: Option<PathBuf>,

        /// Only read the first N lines
        #[arg(long)]
        limit: Option<usize>,

        /// Words per chunk
        #[arg(long)]
        max_words: Option<usize>,

        /// Chunks per embedding call
        #[arg(long)]
        batch_size: Option<usize>,

        /// Embedding backend (overrides config)
        #[arg(long, value_enum, env = "EMBED_PROVIDER")]
        provider: Option<ProviderArg>,

        /// SQLite file (overrides config)
        #[arg(long, value_name = "PATH")]
        db_path: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths, "ingest.log");

    match cli.command {
        Command::Clean {
            input,
            output,
            limit,
        } => {
            let raw: Vec<RawRecord> = read_jsonl(&input, limit)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let read = raw.len();
            let records = clean_corpus(raw);
            write_jsonl(&output, &records)
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(
                "Kept {} of {} records; wrote {}",
                records.len(),
                read,
                output.display()
            );
        }
        Command::Load {
            input,
            cleaned_output,
            limit,
            max_words,
            batch_size,
            provider,
            db_path,
        } => {
            let mut settings = ConfigService::new(paths.clone())
                .load_settings()
                .context("failed to load settings")?;
            if let Some(provider) = provider {
                settings.embedding.provider = provider.into();
            }
            if let Some(db_path) = db_path {
                settings.store.db_path = Some(db_path);
            }

            let mut options = IngestOptions::from(&settings);
            options.limit = limit;
            if let Some(max_words) = max_words {
                options.max_words = max_words.max(1);
            }
            if let Some(batch_size) = batch_size {
                options.batch_size = batch_size.max(1);
            }

            let store = SqliteChunkStore::from_settings(&settings.store, paths.as_ref())
                .await
                .context("failed to open chunk store")?;
            tracing::info!("Loading into {}", store.db_path().display());
            let store: Arc<dyn VectorStore> = Arc::new(store);
            let embedder = build_embedder(&settings, paths.as_ref())
                .context("failed to initialize embedder")?;

            let pipeline = IngestPipeline::new(embedder, store.clone(), options);
            let report = pipeline
                .run(&input, cleaned_output.as_deref())
                .await
                .context("ingestion failed")?;

            tracing::info!(
                "Done: {} read, {} kept, {} chunks written ({} rows in store)",
                report.records_read,
                report.records_kept,
                report.chunks_written,
                store.count().await.context("failed to count store rows")?
            );
        }
    }

    Ok(())
}
