//! SQLite vector store.
//!
//! One database file per workspace with three tables:
//! - `chunks`: one row per chunk, keyed by `(file_path, start_line, end_line)`,
//!   with the embedding stored as a little-endian f32 BLOB
//! - `files`: latest indexed mtime per file, including notes with no chunks
//! - `index_meta`: key/value pairs; `dimensions` is fixed by the first upsert
//!
//! Search is a full scan scored in Rust. Note collections are small enough
//! that this stays well under the latency of the embedding call itself.

use crate::vector;
use async_trait::async_trait;
use lumina_core::error::RetrievalError;
use lumina_core::retrieval::{IndexedChunk, SearchOptions, SearchResult, StoreStatus, VectorStore};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Keeps the newest mtime when a file is recorded again.
const RECORD_FILE: &str = "INSERT INTO files (file_path, modified_at) VALUES (?1, ?2) \
     ON CONFLICT(file_path) DO UPDATE SET modified_at = MAX(modified_at, excluded.modified_at)";

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open (creating if needed) the index database at `path`.
    pub async fn open(path: &Path) -> Result<Self, RetrievalError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| RetrievalError::Storage(format!("failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(path = %path.display(), "vector store opened");
        Ok(store)
    }

    /// In-process ephemeral database.
    pub async fn in_memory() -> Result<Self, RetrievalError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| RetrievalError::Storage(format!("invalid SQLite url: {e}")))?;

        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| RetrievalError::Storage(format!("failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), RetrievalError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                file_path    TEXT NOT NULL,
                start_line   INTEGER NOT NULL,
                end_line     INTEGER NOT NULL,
                heading      TEXT,
                content      TEXT NOT NULL,
                modified_at  INTEGER NOT NULL,
                vector       BLOB NOT NULL,
                PRIMARY KEY (file_path, start_line, end_line)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RetrievalError::MigrationFailed(format!("chunks table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path)")
            .execute(&self.pool)
            .await
            .map_err(|e| RetrievalError::MigrationFailed(format!("file index: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS files (file_path TEXT PRIMARY KEY, modified_at INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RetrievalError::MigrationFailed(format!("files table: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RetrievalError::MigrationFailed(format!("meta table: {e}")))?;

        debug!("vector store migrations complete");
        Ok(())
    }

    async fn stored_dimensions(&self) -> Result<Option<usize>, RetrievalError> {
        let row = sqlx::query("SELECT value FROM index_meta WHERE key = 'dimensions'")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RetrievalError::QueryFailed(format!("read dimensions: {e}")))?;

        Ok(row
            .and_then(|r| r.try_get::<String, _>("value").ok())
            .and_then(|v| v.parse().ok()))
    }

    fn row_to_result(row: &SqliteRow, query: &[f32]) -> Result<SearchResult, RetrievalError> {
        let get_err = |e: sqlx::Error| RetrievalError::QueryFailed(format!("column: {e}"));

        let blob: Vec<u8> = row.try_get("vector").map_err(get_err)?;
        let stored = vector::blob_to_vector(&blob)
            .ok_or_else(|| RetrievalError::QueryFailed("malformed vector blob".into()))?;
        let start_line: i64 = row.try_get("start_line").map_err(get_err)?;
        let end_line: i64 = row.try_get("end_line").map_err(get_err)?;

        Ok(SearchResult {
            file_path: row.try_get("file_path").map_err(get_err)?,
            content: row.try_get("content").map_err(get_err)?,
            score: vector::score(&stored, query)?,
            heading: row.try_get("heading").map_err(get_err)?,
            start_line: start_line as usize,
            end_line: end_line as usize,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<(), RetrievalError> {
        let Some(first) = chunks.first() else {
            return Ok(());
        };
        let dims = first.vector.len();
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() != dims) {
            return Err(RetrievalError::DimensionMismatch {
                expected: dims,
                actual: bad.vector.len(),
            });
        }
        match self.stored_dimensions().await? {
            Some(expected) if expected != dims => {
                return Err(RetrievalError::DimensionMismatch {
                    expected,
                    actual: dims,
                });
            }
            _ => {}
        }

        let storage = |e: sqlx::Error| RetrievalError::Storage(format!("upsert failed: {e}"));
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimensions', ?1)")
            .bind(dims.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        for item in chunks {
            let chunk = &item.chunk;
            sqlx::query(
                r#"
                INSERT INTO chunks (file_path, start_line, end_line, heading, content, modified_at, vector)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(file_path, start_line, end_line) DO UPDATE SET
                    heading = excluded.heading,
                    content = excluded.content,
                    modified_at = excluded.modified_at,
                    vector = excluded.vector
                "#,
            )
            .bind(&chunk.file_path)
            .bind(chunk.start_line as i64)
            .bind(chunk.end_line as i64)
            .bind(&chunk.heading)
            .bind(&chunk.content)
            .bind(chunk.modified_at)
            .bind(vector::vector_to_blob(&item.vector))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

            sqlx::query(RECORD_FILE)
                .bind(&chunk.file_path)
                .bind(chunk.modified_at)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        debug!(count = chunks.len(), "chunks upserted");
        Ok(())
    }

    async fn delete_by_file(&self, file_path: &str) -> Result<usize, RetrievalError> {
        let storage = |e: sqlx::Error| RetrievalError::Storage(format!("DELETE failed: {e}"));
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let result = sqlx::query("DELETE FROM chunks WHERE file_path = ?1")
            .bind(file_path)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        sqlx::query("DELETE FROM files WHERE file_path = ?1")
            .bind(file_path)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        Ok(result.rows_affected() as usize)
    }

    async fn clear(&self) -> Result<(), RetrievalError> {
        sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await
            .map_err(|e| RetrievalError::Storage(format!("CLEAR failed: {e}")))?;
        sqlx::query("DELETE FROM files")
            .execute(&self.pool)
            .await
            .map_err(|e| RetrievalError::Storage(format!("CLEAR files failed: {e}")))?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&self.pool)
            .await
            .map_err(|e| RetrievalError::Storage(format!("CLEAR meta failed: {e}")))?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        if let Some(expected) = self.stored_dimensions().await?
            && expected != query.len()
        {
            return Err(RetrievalError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }

        let rows = sqlx::query(
            "SELECT file_path, start_line, end_line, heading, content, vector FROM chunks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RetrievalError::QueryFailed(format!("vector scan: {e}")))?;

        let mut results: Vec<SearchResult> = rows
            .iter()
            .filter_map(|row| match Self::row_to_result(row, query) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(error = %e, "skipping corrupt chunk row");
                    None
                }
            })
            .filter(|r| options.matches_directory(&r.file_path) && r.score >= options.min_score)
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(options.limit);
        Ok(results)
    }

    async fn mark_indexed(&self, file_path: &str, modified_at: i64) -> Result<(), RetrievalError> {
        sqlx::query(RECORD_FILE)
            .bind(file_path)
            .bind(modified_at)
            .execute(&self.pool)
            .await
            .map_err(|e| RetrievalError::Storage(format!("mark_indexed: {e}")))?;
        Ok(())
    }

    async fn needs_reindex(&self, file_path: &str, modified_at: i64) -> Result<bool, RetrievalError> {
        let row = sqlx::query("SELECT modified_at FROM files WHERE file_path = ?1")
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RetrievalError::QueryFailed(format!("needs_reindex: {e}")))?;

        let stored: Option<i64> = row
            .map(|r| r.try_get("modified_at"))
            .transpose()
            .map_err(|e| RetrievalError::QueryFailed(format!("modified_at column: {e}")))?;

        Ok(stored.is_none_or(|stored| stored < modified_at))
    }

    async fn indexed_files(&self) -> Result<Vec<String>, RetrievalError> {
        let rows = sqlx::query("SELECT file_path FROM files ORDER BY file_path")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RetrievalError::QueryFailed(format!("indexed files: {e}")))?;

        rows.iter()
            .map(|r| {
                r.try_get("file_path")
                    .map_err(|e| RetrievalError::QueryFailed(format!("file_path column: {e}")))
            })
            .collect()
    }

    async fn status(&self) -> Result<StoreStatus, RetrievalError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS chunks, COUNT(DISTINCT file_path) AS files FROM chunks",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RetrievalError::QueryFailed(format!("COUNT: {e}")))?;

        let chunks: i64 = row
            .try_get("chunks")
            .map_err(|e| RetrievalError::QueryFailed(format!("chunks column: {e}")))?;
        let files: i64 = row
            .try_get("files")
            .map_err(|e| RetrievalError::QueryFailed(format!("files column: {e}")))?;

        Ok(StoreStatus {
            total_chunks: chunks as usize,
            total_files: files as usize,
            dimensions: self.stored_dimensions().await?,
        })
    }
}
