//! Retrieval for Lumina: markdown chunking, embeddings, vector storage and
//! reranking, orchestrated by [`RagManager`].

pub mod chunker;
pub mod embedder;
pub mod manager;
pub mod memory_store;
pub mod reranker;
pub mod sqlite_store;
pub mod vector;

pub use chunker::{MarkdownChunker, count_tokens};
pub use embedder::{HashEmbedder, ProviderEmbedder};
pub use manager::{DATA_DIR, INDEX_FILE, IndexReport, RagManager};
pub use memory_store::InMemoryVectorStore;
pub use reranker::{DisabledReranker, HttpReranker, LexicalReranker};
pub use sqlite_store::SqliteVectorStore;
pub use vector::cosine_similarity;
