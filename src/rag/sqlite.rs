//! SQLite-backed chunk store.
//!
//! Embeddings are stored as JSON arrays and the similarity score is computed
//! by SQLite itself: a per-row dot product over `json_each`, sorted and
//! limited in the same statement. Search is exhaustive.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkRecord, RetrievalHit, VectorStore};
use crate::core::config::validation::is_valid_table_name;
use crate::core::config::{AppPaths, StoreSettings};
use crate::core::errors::ApiError;

const META_EMBEDDING_MODEL: &str = "embedding_model";
const META_EMBEDDING_DIM: &str = "embedding_dim";

pub struct SqliteChunkStore {
    pool: SqlitePool,
    table: String,
    meta_table: String,
    db_path: PathBuf,
}

impl SqliteChunkStore {
    pub async fn from_settings(settings: &StoreSettings, paths: &AppPaths) -> Result<Self, ApiError> {
        let db_path = match settings.db_path.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => paths.resolve(raw),
            _ => paths.default_db_path.clone(),
        };
        // A blank or unusable table still boots; requests are refused by
        // `Settings::require_serving`.
        let table = match settings.table.trim() {
            name if is_valid_table_name(name) => name.to_string(),
            name => {
                if !name.is_empty() {
                    tracing::warn!("Store table '{}' is not usable, opening the default table", name);
                }
                StoreSettings::default().table
            }
        };
        Self::with_path(db_path, &table).await
    }

    pub async fn with_path(db_path: PathBuf, table: &str) -> Result<Self, ApiError> {
        if !is_valid_table_name(table) {
            return Err(ApiError::Misconfigured(format!(
                "store table '{}' is not a plain SQL identifier",
                table
            )));
        }

        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self {
            pool,
            table: table.to_string(),
            meta_table: format!("{}_meta", table),
            db_path,
        };
        store.init_schema().await?;
        tracing::debug!(
            "Chunk store ready at {} (table {})",
            store.db_path.display(),
            store.table
        );
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                chunk_index INTEGER NOT NULL,
                chunk_text TEXT NOT NULL,
                embedding TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
            self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_doc ON {}(doc_id)",
            self.table, self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
            self.meta_table
        ))
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Result<String, ApiError> {
        serde_json::to_string(embedding).map_err(ApiError::internal)
    }

    fn row_to_hit(row: &sqlx::sqlite::SqliteRow) -> Result<RetrievalHit, ApiError> {
        let score: f64 = row.try_get("score").map_err(ApiError::upstream)?;
        Ok(RetrievalHit {
            id: row.try_get("id").map_err(ApiError::upstream)?,
            title: row.try_get("title").map_err(ApiError::upstream)?,
            chunk_text: row.try_get("chunk_text").map_err(ApiError::upstream)?,
            score: score as f32,
        })
    }

    pub async fn embedding_model(&self) -> Result<Option<String>, ApiError> {
        self.meta_value(META_EMBEDDING_MODEL).await
    }

    async fn meta_value(&self, key: &str) -> Result<Option<String>, ApiError> {
        sqlx::query_scalar(&format!(
            "SELECT value FROM {} WHERE key = ?1",
            self.meta_table
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::upstream)
    }
}

#[async_trait]
impl VectorStore for SqliteChunkStore {
    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievalHit>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if query_embedding.is_empty() {
            return Err(ApiError::Internal("query embedding is empty".to_string()));
        }
        if let Some(dim) = self.embedding_dim().await? {
            if dim != query_embedding.len() {
                return Err(ApiError::Misconfigured(format!(
                    "query embedding has {} dimensions but the store holds {}-dimensional vectors",
                    query_embedding.len(),
                    dim
                )));
            }
        }

        let query_json = Self::serialize_embedding(query_embedding)?;
        let sql = format!(
            "SELECT c.id, c.title, c.chunk_text,
                    CAST(COALESCE((
                        SELECT SUM(e.value * q.value)
                        FROM json_each(c.embedding) AS e
                        JOIN json_each(?1) AS q ON e.key = q.key
                    ), 0.0) AS REAL) AS score
             FROM {} AS c
             ORDER BY score DESC
             LIMIT ?2",
            self.table
        );

        let rows = sqlx::query(&sql)
            .bind(&query_json)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::upstream)?;

        rows.iter().map(Self::row_to_hit).collect()
    }

    async fn replace_all(
        &self,
        records: Vec<ChunkRecord>,
        embedding_model: &str,
    ) -> Result<usize, ApiError> {
        let dim = records.first().map(|r| r.embedding.len());
        if let Some(dim) = dim {
            if let Some(bad) = records.iter().find(|r| r.embedding.len() != dim) {
                return Err(ApiError::Misconfigured(format!(
                    "chunk {} has {} dimensions, expected {}",
                    bad.id,
                    bad.embedding.len(),
                    dim
                )));
            }
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        let insert = format!(
            "INSERT OR REPLACE INTO {} (id, doc_id, title, chunk_index, chunk_text, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            self.table
        );
        for record in &records {
            let embedding = Self::serialize_embedding(&record.embedding)?;
            sqlx::query(&insert)
                .bind(&record.id)
                .bind(&record.doc_id)
                .bind(&record.title)
                .bind(record.chunk_index as i64)
                .bind(&record.chunk_text)
                .bind(&embedding)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;
        }

        let upsert_meta = format!(
            "INSERT OR REPLACE INTO {} (key, value, updated_at)
             VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
            self.meta_table
        );
        sqlx::query(&upsert_meta)
            .bind(META_EMBEDDING_MODEL)
            .bind(embedding_model)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        match dim {
            Some(dim) => {
                sqlx::query(&upsert_meta)
                    .bind(META_EMBEDDING_DIM)
                    .bind(dim.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(ApiError::internal)?;
            }
            None => {
                sqlx::query(&format!("DELETE FROM {} WHERE key = ?1", self.meta_table))
                    .bind(META_EMBEDDING_DIM)
                    .execute(&mut *tx)
                    .await
                    .map_err(ApiError::internal)?;
            }
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(records.len())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::upstream)?;

        Ok(count as usize)
    }

    async fn embedding_dim(&self) -> Result<Option<usize>, ApiError> {
        let Some(raw) = self.meta_value(META_EMBEDDING_DIM).await? else {
            return Ok(None);
        };
        raw.parse::<usize>().map(Some).map_err(|_| {
            ApiError::Misconfigured(format!("stored embedding_dim '{}' is not a number", raw))
        })
    }
}
