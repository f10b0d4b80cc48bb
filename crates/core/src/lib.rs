//! # Lumina Core
//!
//! Domain types, traits, and error definitions for the Lumina note agent.
//! This crate has **no framework dependencies**: it defines the model that
//! the provider, retrieval, tool, and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates:
//! - [`Provider`] is implemented in `lumina-providers`
//! - [`Embedder`], [`Reranker`], [`VectorStore`] are implemented in `lumina-rag`
//! - [`Tool`] executors live in `lumina-tools`
//! - the state machine consuming all of them lives in `lumina-agent`

pub mod error;
pub mod value;
pub mod message;
pub mod provider;
pub mod stream;
pub mod tool;
pub mod retrieval;
pub mod agent;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use value::{ParamValue, Params};
pub use message::{Conversation, Message, Role};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, StreamChunk,
    Usage,
};
pub use stream::{ChunkSender, ChunkStream};
pub use tool::{Tool, ToolCall, ToolContext, ToolDefinition, ToolRegistry, ToolResult};
pub use retrieval::{
    Chunk, Embedder, IndexProgress, IndexStatus, IndexedChunk, Reranker, SearchOptions,
    SearchResult, StoreStatus, VectorStore,
};
pub use agent::{AgentConfig, AgentMode, AgentRole, AgentStatus, Plan, PlanStep, TaskContext};
pub use event::{AgentEvent, EventBus, PendingAction};
