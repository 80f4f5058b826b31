use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::errors::ApiError;

/// Reads one JSON value per line, stopping after `limit` lines when given.
/// Blank lines are skipped.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path, limit: Option<usize>) -> Result<Vec<T>, ApiError> {
    let file = File::open(path)
        .map_err(|e| ApiError::BadRequest(format!("Failed to open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        if limit.is_some_and(|limit| index >= limit) {
            break;
        }
        let line = line.map_err(ApiError::internal)?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|e| {
            ApiError::BadRequest(format!("{}:{}: {}", path.display(), index + 1, e))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize, ApiError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(ApiError::internal)?;
    }
    let file = File::create(path)
        .map_err(|e| ApiError::Internal(format!("Failed to create {}: {}", path.display(), e)))?;
    let mut writer = BufWriter::new(file);

    for row in rows {
        serde_json::to_writer(&mut writer, row).map_err(ApiError::internal)?;
        writer.write_all(b"\n").map_err(ApiError::internal)?;
    }
    writer.flush().map_err(ApiError::internal)?;
    Ok(rows.len())
}
