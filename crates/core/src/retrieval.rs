//! Retrieval traits for chunks, embeddings, vector storage and reranking.
//!
//! The retrieval pipeline turns notes into searchable vectors:
//! chunker → [`Embedder`] → [`VectorStore`] → optional [`Reranker`].
//! Implementations live in `lumina-rag`.

use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A bounded excerpt of one note plus its location.
///
/// Identity is `(file_path, start_line, end_line)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Workspace-relative path with `/` separators
    pub file_path: String,

    pub content: String,

    /// Nearest enclosing markdown heading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,

    /// 1-based, inclusive
    pub start_line: usize,

    /// 1-based, inclusive
    pub end_line: usize,

    /// Source file modification time, milliseconds since the epoch
    pub modified_at: i64,
}

/// A chunk together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One ranked retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_path: String,
    pub content: String,

    /// Similarity in `[0, 1]`
    pub score: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
}

/// Options for a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Results scoring below this are never returned
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Restrict results to files under this workspace-relative directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

fn default_limit() -> usize {
    10
}

fn default_min_score() -> f32 {
    0.3
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            min_score: default_min_score(),
            directory: None,
        }
    }
}

impl SearchOptions {
    /// Whether `file_path` falls under the directory filter.
    pub fn matches_directory(&self, file_path: &str) -> bool {
        match self.directory.as_deref().map(|d| d.trim_matches('/')) {
            None | Some("") | Some(".") => true,
            Some(dir) => file_path
                .strip_prefix(dir)
                .is_some_and(|rest| rest.starts_with('/')),
        }
    }
}

/// Retrieval index status reported to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub initialized: bool,
    pub total_chunks: usize,
    pub total_files: usize,
    pub is_indexing: bool,
}

/// Counters reported by a vector store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub total_chunks: usize,
    pub total_files: usize,

    /// Embedding dimension fixed by the first upsert, if any
    pub dimensions: Option<usize>,
}

/// Progress of an indexing pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexProgress {
    pub current: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
}

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Output dimension; constant for the lifetime of an index.
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("embedder returned no vector".into()))
    }

    /// Embed many texts, one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;
}

/// Second-pass relevance ordering over an oversampled candidate set.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Disabled rerankers are skipped entirely, including oversampling.
    fn is_enabled(&self) -> bool;

    /// Reorder `candidates` by relevance to `query`. The caller truncates.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>, RetrievalError>;
}

/// Persistent chunk vectors keyed by chunk identity.
///
/// Implementations: SQLite, in-memory (for testing).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace chunks by `(file_path, start_line, end_line)`.
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<(), RetrievalError>;

    /// Delete every chunk of one file, returning how many were removed.
    async fn delete_by_file(&self, file_path: &str) -> Result<usize, RetrievalError>;

    async fn clear(&self) -> Result<(), RetrievalError>;

    /// Rank stored chunks by cosine similarity, highest first.
    async fn search(
        &self,
        query: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, RetrievalError>;

    /// Record that `file_path` was indexed at `modified_at`, even when it
    /// produced no chunks. Upserted chunks record their file as well.
    async fn mark_indexed(&self, file_path: &str, modified_at: i64) -> Result<(), RetrievalError>;

    /// True when the file was never recorded or its stored mtime is older.
    async fn needs_reindex(&self, file_path: &str, modified_at: i64) -> Result<bool, RetrievalError>;

    /// Every recorded file path, including files that produced no chunks.
    async fn indexed_files(&self) -> Result<Vec<String>, RetrievalError>;

    async fn status(&self) -> Result<StoreStatus, RetrievalError>;
}
