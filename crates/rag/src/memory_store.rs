//! In-memory vector store, for tests and throwaway sessions.

use crate::vector;
use async_trait::async_trait;
use lumina_core::error::RetrievalError;
use lumina_core::retrieval::{IndexedChunk, SearchOptions, SearchResult, StoreStatus, VectorStore};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

type ChunkKey = (String, usize, usize);

#[derive(Default)]
struct Inner {
    chunks: BTreeMap<ChunkKey, IndexedChunk>,
    /// Latest indexed mtime per file
    files: BTreeMap<String, i64>,
    dimensions: Option<usize>,
}

impl Inner {
    fn record(&mut self, file_path: &str, modified_at: i64) {
        let stored = self.files.entry(file_path.to_string()).or_insert(modified_at);
        *stored = (*stored).max(modified_at);
    }
}

/// A [`VectorStore`] held entirely in a map. Nothing is persisted.
#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<(), RetrievalError> {
        let mut inner = self.inner.write().await;
        for item in chunks {
            let expected = *inner.dimensions.get_or_insert(item.vector.len());
            if item.vector.len() != expected {
                return Err(RetrievalError::DimensionMismatch {
                    expected,
                    actual: item.vector.len(),
                });
            }
            let key = (
                item.chunk.file_path.clone(),
                item.chunk.start_line,
                item.chunk.end_line,
            );
            inner.chunks.insert(key, item.clone());
            inner.record(&item.chunk.file_path, item.chunk.modified_at);
        }
        Ok(())
    }

    async fn delete_by_file(&self, file_path: &str) -> Result<usize, RetrievalError> {
        let mut inner = self.inner.write().await;
        let before = inner.chunks.len();
        inner.chunks.retain(|(path, _, _), _| path != file_path);
        inner.files.remove(file_path);
        Ok(before - inner.chunks.len())
    }

    async fn clear(&self) -> Result<(), RetrievalError> {
        let mut inner = self.inner.write().await;
        inner.chunks.clear();
        inner.files.clear();
        inner.dimensions = None;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let inner = self.inner.read().await;
        let mut results = Vec::new();
        for item in inner.chunks.values() {
            if !options.matches_directory(&item.chunk.file_path) {
                continue;
            }
            let score = vector::score(&item.vector, query)?;
            if score >= options.min_score {
                results.push(SearchResult {
                    file_path: item.chunk.file_path.clone(),
                    content: item.chunk.content.clone(),
                    score,
                    heading: item.chunk.heading.clone(),
                    start_line: item.chunk.start_line,
                    end_line: item.chunk.end_line,
                });
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(options.limit);
        Ok(results)
    }

    async fn mark_indexed(&self, file_path: &str, modified_at: i64) -> Result<(), RetrievalError> {
        self.inner.write().await.record(file_path, modified_at);
        Ok(())
    }

    async fn needs_reindex(&self, file_path: &str, modified_at: i64) -> Result<bool, RetrievalError> {
        let inner = self.inner.read().await;
        Ok(inner
            .files
            .get(file_path)
            .is_none_or(|stored| *stored < modified_at))
    }

    async fn indexed_files(&self) -> Result<Vec<String>, RetrievalError> {
        Ok(self.inner.read().await.files.keys().cloned().collect())
    }

    async fn status(&self) -> Result<StoreStatus, RetrievalError> {
        let inner = self.inner.read().await;
        let files: BTreeSet<&String> = inner.chunks.keys().map(|(path, _, _)| path).collect();
        Ok(StoreStatus {
            total_chunks: inner.chunks.len(),
            total_files: files.len(),
            dimensions: inner.dimensions,
        })
    }
}
