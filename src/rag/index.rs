//! SQLite-backed vector index.
//!
//! One database file per corpus inside the index directory. Chunk text and
//! scalar metadata live in `chunks`, embeddings as little-endian `f32`
//! blobs; similarity is brute-force cosine.
//!
//! A new corpus is always written to a staging file first and renamed over
//! the live file only once every row is committed, so a failed build never
//! touches the corpus queries are served from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::chunker::Chunk;
use crate::core::errors::{EmbeddingFailure, RagError};

pub const INDEX_FILE: &str = "index.sqlite3";
const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";

/// A retrieved chunk with its normalized similarity score in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub dimension: usize,
    pub embedding_model: String,
    pub created_at: String,
}

pub struct SqliteIndex {
    pool: SqlitePool,
    path: PathBuf,
    meta: IndexMeta,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex")
            .field("path", &self.path)
            .field("meta", &self.meta)
            .finish()
    }
}

impl SqliteIndex {
    pub fn live_path(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    async fn connect(path: &Path, create: bool) -> Result<SqlitePool, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Delete)
            .synchronous(SqliteSynchronous::Full);

        SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
    }

    /// Reopens the live index in `dir`, if one exists.
    pub async fn open_existing(dir: &Path) -> Result<Option<Self>, RagError> {
        let path = Self::live_path(dir);
        if !path.is_file() {
            return Ok(None);
        }

        let pool = Self::connect(&path, false).await.map_err(RagError::index)?;
        let meta = read_meta(&pool).await?;

        Ok(Some(Self { pool, path, meta }))
    }

    /// Writes `items` to a fresh index and atomically makes it the live one.
    ///
    /// On any failure the staging file is removed and the live file, if
    /// any, is left as it was.
    pub async fn build(
        dir: &Path,
        embedding_model: &str,
        dimension: usize,
        items: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<Self, RagError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(RagError::index_build)?;

        let staging = dir.join(format!("{}{}.sqlite3", STAGING_PREFIX, Uuid::new_v4()));
        let written = match write_staging(&staging, embedding_model, dimension, &items).await {
            Ok(()) => validate_staging(&staging, dimension).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }

        let index = Self::promote(dir, &staging).await?;

        tracing::info!(
            path = %index.path.display(),
            chunks = items.len(),
            dimension,
            "Vector index built"
        );

        Ok(index)
    }

    /// Moves a validated staging file into place and opens it. The previous
    /// live file is kept under a retired name until the new one is open, and
    /// put back if opening fails.
    async fn promote(dir: &Path, staging: &Path) -> Result<Self, RagError> {
        let live = Self::live_path(dir);
        let retired = dir.join(format!("{}{}.sqlite3", RETIRED_PREFIX, Uuid::new_v4()));

        let had_live = tokio::fs::try_exists(&live)
            .await
            .map_err(RagError::index_build)?;
        if had_live {
            if let Err(e) = tokio::fs::rename(&live, &retired).await {
                let _ = tokio::fs::remove_file(staging).await;
                return Err(RagError::index_build(e));
            }
        }

        if let Err(e) = tokio::fs::rename(staging, &live).await {
            let _ = tokio::fs::remove_file(staging).await;
            if had_live {
                let _ = tokio::fs::rename(&retired, &live).await;
            }
            return Err(RagError::index_build(e));
        }

        match Self::open_live(&live).await {
            Ok(index) => {
                if had_live {
                    if let Err(e) = tokio::fs::remove_file(&retired).await {
                        tracing::warn!(path = %retired.display(), "Failed to remove retired index: {}", e);
                    }
                }
                Ok(index)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&live).await;
                if had_live {
                    if let Err(restore) = tokio::fs::rename(&retired, &live).await {
                        tracing::error!("Failed to put previous index back: {}", restore);
                    }
                }
                Err(e)
            }
        }
    }

    async fn open_live(live: &Path) -> Result<Self, RagError> {
        let pool = Self::connect(live, false)
            .await
            .map_err(RagError::index_build)?;
        let meta = match read_meta(&pool).await {
            Ok(meta) => meta,
            Err(e) => {
                pool.close().await;
                return Err(RagError::IndexBuild(e.to_string()));
            }
        };
        Ok(Self {
            pool,
            path: live.to_path_buf(),
            meta,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn dimension(&self) -> usize {
        self.meta.dimension
    }

    pub async fn count(&self) -> Result<usize, RagError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::index)?;
        Ok(count as usize)
    }

    /// Returns at most `k` chunks scoring at least `score_threshold`,
    /// best first. Equal scores keep ingest order.
    pub async fn query(
        &self,
        vector: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        if vector.len() != self.meta.dimension {
            return Err(EmbeddingFailure::DimensionMismatch {
                expected: self.meta.dimension,
                actual: vector.len(),
            }
            .into());
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, content, source, page, chunk_index, start_offset, embedding
             FROM chunks
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::index)?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = deserialize_embedding(&blob);
                let score = similarity(vector, &stored);
                (score >= score_threshold).then(|| ScoredChunk {
                    chunk: row_to_chunk(row),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Deletes the live index file in `dir`. Open handles keep reading the
    /// unlinked file until they are dropped.
    pub async fn remove(dir: &Path) -> Result<(), RagError> {
        match tokio::fs::remove_file(Self::live_path(dir)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RagError::index(e)),
        }
    }

    /// Cleans up after an interrupted build: staging files are removed, and
    /// a retired index is put back if no live one exists.
    pub async fn remove_stale_staging(dir: &Path) {
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return;
        };
        let live = Self::live_path(dir);
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            if name.starts_with(RETIRED_PREFIX) && !live.is_file() {
                match tokio::fs::rename(&path, &live).await {
                    Ok(()) => tracing::warn!(path = %path.display(), "Restored retired index"),
                    Err(e) => tracing::warn!(path = %path.display(), "Failed to restore retired index: {}", e),
                }
                continue;
            }

            if name.starts_with(STAGING_PREFIX) || name.starts_with(RETIRED_PREFIX) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => tracing::info!(path = %path.display(), "Removed stale index staging file"),
                    Err(e) => tracing::warn!(path = %path.display(), "Failed to remove staging file: {}", e),
                }
            }
        }
    }
}

async fn write_staging(
    path: &Path,
    embedding_model: &str,
    dimension: usize,
    items: &[(Chunk, Vec<f32>)],
) -> Result<(), RagError> {
    let pool = SqliteIndex::connect(path, true)
        .await
        .map_err(RagError::index_build)?;

    let result = async {
        init_schema(&pool).await?;

        let mut tx = pool.begin().await?;

        for (key, value) in [
            ("embedding_dimension", dimension.to_string()),
            ("embedding_model", embedding_model.to_string()),
            ("created_at", chrono::Utc::now().to_rfc3339()),
        ] {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        for (chunk, embedding) in items {
            sqlx::query(
                "INSERT INTO chunks (chunk_id, content, source, page, chunk_index, start_offset, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.text)
            .bind(&chunk.source)
            .bind(chunk.page as i64)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.start_offset as i64)
            .bind(serialize_embedding(embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }
    .await;

    pool.close().await;
    result.map_err(RagError::index_build)
}

/// Opens the freshly written staging file and checks it reads back with the
/// expected dimension.
async fn validate_staging(path: &Path, dimension: usize) -> Result<(), RagError> {
    let pool = SqliteIndex::connect(path, false)
        .await
        .map_err(RagError::index_build)?;
    let meta = read_meta(&pool).await;
    pool.close().await;

    let meta = meta?;
    if meta.dimension != dimension {
        return Err(RagError::IndexBuild(format!(
            "staging index reports dimension {}, expected {}",
            meta.dimension, dimension
        )));
    }
    Ok(())
}

async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT '',
            page INTEGER NOT NULL DEFAULT 1,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL DEFAULT 0,
            embedding BLOB NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn read_meta(pool: &SqlitePool) -> Result<IndexMeta, RagError> {
    let rows = sqlx::query("SELECT key, value FROM index_meta")
        .fetch_all(pool)
        .await
        .map_err(RagError::index)?;

    let mut dimension = None;
    let mut embedding_model = String::new();
    let mut created_at = String::new();
    for row in &rows {
        let key: String = row.get("key");
        let value: String = row.get("value");
        match key.as_str() {
            "embedding_dimension" => dimension = value.parse::<usize>().ok(),
            "embedding_model" => embedding_model = value,
            "created_at" => created_at = value,
            _ => {}
        }
    }

    let dimension =
        dimension.ok_or_else(|| RagError::Index("index has no embedding dimension".to_string()))?;

    Ok(IndexMeta {
        dimension,
        embedding_model,
        created_at,
    })
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let page: i64 = row.get("page");
    let chunk_index: i64 = row.get("chunk_index");
    let start_offset: i64 = row.get("start_offset");

    Chunk {
        chunk_id: row.get("chunk_id"),
        text: row.get("content"),
        source: row.get("source"),
        page: page as u32,
        chunk_index: chunk_index as usize,
        start_offset: start_offset as usize,
    }
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity mapped onto `[0, 1]`; opposite directions score 0.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(0.0, 1.0) as f32
}
