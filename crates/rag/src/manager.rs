//! `RagManager`: indexing passes and semantic search over one workspace.

use crate::chunker::MarkdownChunker;
use crate::embedder::{HashEmbedder, ProviderEmbedder};
use crate::reranker::{DisabledReranker, HttpReranker, LexicalReranker};
use crate::sqlite_store::SqliteVectorStore;
use lumina_config::{ProviderConfig, RagConfig};
use lumina_core::error::{Error, RetrievalError};
use lumina_core::retrieval::{
    Embedder, IndexProgress, IndexStatus, IndexedChunk, Reranker, SearchOptions, SearchResult,
    VectorStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Private per-workspace data directory.
pub const DATA_DIR: &str = ".lumina";

/// Index database file inside [`DATA_DIR`].
pub const INDEX_FILE: &str = "vectors.db";

/// Counters from one indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub files_removed: usize,
}

/// A markdown file found by the workspace scan.
#[derive(Debug, Clone)]
struct NoteFile {
    /// Workspace-relative, `/`-separated
    rel_path: String,
    abs_path: PathBuf,
    modified_at: i64,
}

/// Clears the indexing flag when a pass ends, including on error.
struct IndexingGuard<'a>(&'a AtomicBool);

impl<'a> IndexingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, RetrievalError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RetrievalError::AlreadyIndexing)?;
        Ok(Self(flag))
    }
}

impl Drop for IndexingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RagManager {
    config: RagConfig,
    chunker: MarkdownChunker,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    store: RwLock<Option<Arc<dyn VectorStore>>>,
    workspace: RwLock<Option<PathBuf>>,
    indexing: AtomicBool,
}

impl RagManager {
    pub fn new(config: RagConfig, embedder: Arc<dyn Embedder>, reranker: Arc<dyn Reranker>) -> Self {
        Self {
            chunker: MarkdownChunker::new(&config.chunking),
            config,
            embedder,
            reranker,
            store: RwLock::new(None),
            workspace: RwLock::new(None),
            indexing: AtomicBool::new(false),
        }
    }

    /// Build the embedder and reranker named by `config`.
    ///
    /// `chat` supplies credentials when the embedding vendor matches the chat
    /// vendor. Fails before any network call if a vendor is unknown or has no key.
    pub fn from_config(config: &RagConfig, chat: &ProviderConfig) -> lumina_core::Result<Self> {
        let embedder = build_embedder(config, chat)?;
        let reranker = build_reranker(config, chat)?;
        Ok(Self::new(config.clone(), embedder, reranker))
    }

    /// Open `<workspace>/.lumina/vectors.db`, creating it if needed.
    pub async fn initialize(&self, workspace: &Path) -> Result<(), RetrievalError> {
        let data_dir = workspace.join(DATA_DIR);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| RetrievalError::Storage(format!("create {}: {e}", data_dir.display())))?;

        let store = SqliteVectorStore::open(&data_dir.join(INDEX_FILE)).await?;
        self.initialize_with_store(workspace, Arc::new(store)).await;
        Ok(())
    }

    /// Attach an already opened store.
    pub async fn initialize_with_store(&self, workspace: &Path, store: Arc<dyn VectorStore>) {
        *self.workspace.write().await = Some(workspace.to_path_buf());
        *self.store.write().await = Some(store);
        info!(workspace = %workspace.display(), "retrieval initialized");
    }

    pub async fn is_initialized(&self) -> bool {
        self.store.read().await.is_some()
    }

    pub fn is_indexing(&self) -> bool {
        self.indexing.load(Ordering::Acquire)
    }

    /// Search defaults from configuration.
    pub fn default_options(&self) -> SearchOptions {
        SearchOptions {
            limit: self.config.max_results,
            min_score: self.config.min_score,
            directory: None,
        }
    }

    async fn store(&self) -> Result<Arc<dyn VectorStore>, RetrievalError> {
        self.store
            .read()
            .await
            .clone()
            .ok_or(RetrievalError::NotInitialized)
    }

    async fn workspace(&self) -> Result<PathBuf, RetrievalError> {
        self.workspace
            .read()
            .await
            .clone()
            .ok_or(RetrievalError::NotInitialized)
    }

    /// Clear the index and rebuild it from every markdown file.
    pub async fn full_index(
        &self,
        progress: &(dyn Fn(IndexProgress) + Send + Sync),
    ) -> Result<IndexReport, RetrievalError> {
        let store = self.store().await?;
        let workspace = self.workspace().await?;
        let _guard = IndexingGuard::acquire(&self.indexing)?;

        info!(workspace = %workspace.display(), "full index started");
        store.clear().await?;
        let files = scan_markdown(&workspace).await?;

        let mut report = IndexReport::default();
        let total = files.len();
        for (current, file) in files.iter().enumerate() {
            progress(IndexProgress {
                current,
                total,
                current_file: Some(file.rel_path.clone()),
            });
            if let Some(chunks) = self.index_note(store.as_ref(), file).await? {
                report.files_indexed += 1;
                report.chunks_indexed += chunks;
            }
        }
        progress(IndexProgress {
            current: total,
            total,
            current_file: None,
        });

        info!(
            files = report.files_indexed,
            chunks = report.chunks_indexed,
            "full index finished"
        );
        Ok(report)
    }

    /// Re-index only files whose stored modification time is stale, and drop
    /// files that no longer exist.
    pub async fn incremental_index(
        &self,
        progress: &(dyn Fn(IndexProgress) + Send + Sync),
    ) -> Result<IndexReport, RetrievalError> {
        let store = self.store().await?;
        let workspace = self.workspace().await?;
        let _guard = IndexingGuard::acquire(&self.indexing)?;

        info!(workspace = %workspace.display(), "incremental index started");
        let files = scan_markdown(&workspace).await?;

        let mut report = IndexReport::default();
        for stale in store.indexed_files().await? {
            if !files.iter().any(|f| f.rel_path == stale) {
                store.delete_by_file(&stale).await?;
                report.files_removed += 1;
                debug!(file = %stale, "removed deleted note from index");
            }
        }

        let mut pending = Vec::new();
        for file in files {
            if store.needs_reindex(&file.rel_path, file.modified_at).await? {
                pending.push(file);
            }
        }

        let total = pending.len();
        for (current, file) in pending.iter().enumerate() {
            progress(IndexProgress {
                current,
                total,
                current_file: Some(file.rel_path.clone()),
            });
            store.delete_by_file(&file.rel_path).await?;
            if let Some(chunks) = self.index_note(store.as_ref(), file).await? {
                report.files_indexed += 1;
                report.chunks_indexed += chunks;
            }
        }
        progress(IndexProgress {
            current: total,
            total,
            current_file: None,
        });

        info!(
            files = report.files_indexed,
            chunks = report.chunks_indexed,
            removed = report.files_removed,
            "incremental index finished"
        );
        Ok(report)
    }

    /// Read and index one scanned file. Unreadable files are skipped.
    async fn index_note(
        &self,
        store: &dyn VectorStore,
        file: &NoteFile,
    ) -> Result<Option<usize>, RetrievalError> {
        match tokio::fs::read_to_string(&file.abs_path).await {
            Ok(content) => {
                let count = self
                    .embed_and_store(store, &file.rel_path, &content, file.modified_at)
                    .await?;
                Ok(Some(count))
            }
            Err(e) => {
                warn!(file = %file.rel_path, error = %e, "skipping unreadable note");
                Ok(None)
            }
        }
    }

    /// Replace the index entries of one file with chunks of `content`.
    pub async fn index_file(
        &self,
        file_path: &str,
        content: &str,
        modified_at: i64,
    ) -> Result<usize, RetrievalError> {
        let store = self.store().await?;
        store.delete_by_file(file_path).await?;
        self.embed_and_store(store.as_ref(), file_path, content, modified_at)
            .await
    }

    async fn embed_and_store(
        &self,
        store: &dyn VectorStore,
        file_path: &str,
        content: &str,
        modified_at: i64,
    ) -> Result<usize, RetrievalError> {
        let chunks = self.chunker.chunk(content, file_path, modified_at);
        if chunks.is_empty() {
            // No rows to carry the mtime, so record the file itself
            store.mark_indexed(file_path, modified_at).await?;
            debug!(file = %file_path, "no chunks");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(RetrievalError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk { chunk, vector })
            .collect();
        store.upsert(&indexed).await?;
        debug!(file = %file_path, chunks = indexed.len(), "indexed");
        Ok(indexed.len())
    }

    pub async fn remove_file(&self, file_path: &str) -> Result<usize, RetrievalError> {
        self.store().await?.delete_by_file(file_path).await
    }

    /// Embed `query`, rank stored chunks, and rerank when enabled.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let store = self.store().await?;
        let query_vector = self.embedder.embed(query).await?;

        let reranking = self.reranker.is_enabled();
        let mut store_options = options.clone();
        if reranking {
            store_options.limit = self.config.reranker.candidate_count(options.limit);
        }

        let mut results = store.search(&query_vector, &store_options).await?;
        if reranking && !results.is_empty() {
            let candidates = results.clone();
            match self.reranker.rerank(query, candidates).await {
                Ok(reranked) => results = reranked,
                Err(e) => warn!(error = %e, "rerank failed; keeping vector order"),
            }
        }

        results.retain(|r| r.score >= options.min_score);
        results.truncate(options.limit);
        debug!(query = %query, results = results.len(), "semantic search");
        Ok(results)
    }

    pub async fn status(&self) -> Result<IndexStatus, RetrievalError> {
        let is_indexing = self.is_indexing();
        let Some(store) = self.store.read().await.clone() else {
            return Ok(IndexStatus {
                is_indexing,
                ..Default::default()
            });
        };

        let status = store.status().await?;
        Ok(IndexStatus {
            initialized: true,
            total_chunks: status.total_chunks,
            total_files: status.total_files,
            is_indexing,
        })
    }
}

fn build_embedder(config: &RagConfig, chat: &ProviderConfig) -> lumina_core::Result<Arc<dyn Embedder>> {
    let embedding = &config.embedding;
    if embedding.provider == "hash" {
        return Ok(Arc::new(HashEmbedder::new(embedding.dimensions)));
    }

    let provider = lumina_providers::create_embedding_provider(embedding, chat)?;
    Ok(Arc::new(ProviderEmbedder::new(
        provider,
        embedding.model.clone(),
        embedding.dimensions,
        embedding.batch_size,
    )))
}

fn build_reranker(config: &RagConfig, chat: &ProviderConfig) -> lumina_core::Result<Arc<dyn Reranker>> {
    let reranker = &config.reranker;
    if !reranker.enabled {
        return Ok(Arc::new(DisabledReranker));
    }

    match reranker.provider.as_str() {
        "lexical" => Ok(Arc::new(LexicalReranker::default())),
        "http" => {
            let base_url = reranker.base_url.clone().ok_or_else(|| Error::Config {
                message: "rag.reranker.base_url is required for the http reranker".into(),
            })?;
            let model = reranker.model.clone().unwrap_or_default();
            let reranker = HttpReranker::new(
                base_url,
                model,
                reranker.api_key.clone(),
                Duration::from_secs(chat.request_timeout_secs),
            )?;
            Ok(Arc::new(reranker))
        }
        other => Err(Error::Config {
            message: format!("unknown reranker '{other}' (expected lexical or http)"),
        }),
    }
}

/// Every non-hidden `.md` file under `root`, sorted by relative path.
async fn scan_markdown(root: &Path) -> Result<Vec<NoteFile>, RetrievalError> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files: Vec<NoteFile> = walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "md"))
            .filter_map(|entry| {
                let rel = entry.path().strip_prefix(&root).ok()?;
                let rel_path = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let modified_at = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                Some(NoteFile {
                    rel_path,
                    abs_path: entry.into_path(),
                    modified_at,
                })
            })
            .collect();
        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        files
    })
    .await
    .map_err(|e| RetrievalError::Storage(format!("workspace scan failed: {e}")))
}
