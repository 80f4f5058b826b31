//! Offline corpus preparation: clean raw paper metadata, keep the latest
//! version of each paper, chunk and embed abstracts, and load the store.

pub mod clean;
pub mod jsonl;
pub mod pipeline;

pub use clean::{clean_corpus, clean_record, dedupe_latest, CleanRecord, RawRecord};
pub use jsonl::{read_jsonl, write_jsonl};
pub use pipeline::{IngestOptions, IngestPipeline, IngestReport};
