//! Provider trait, the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get a response
//! back, either as a complete message or as a stream of chunks.
//!
//! Tool use never travels through vendor function-calling: calls are embedded
//! in the response text and extracted by the agent's response parser.

use crate::error::ProviderError;
use crate::message::Message;
use crate::stream::ChunkStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini", "deepseek-chat")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            stream: false,
            stop: Vec::new(),
        }
    }
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Visible content delta
    Text { text: String },
    /// Model reasoning delta, shown to the user but never parsed for tools
    Reasoning { text: String },
    /// Token accounting, usually once near the end
    Usage { usage: Usage },
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The model to use for embeddings (e.g., "text-embedding-3-small").
    pub model: String,

    /// The texts to embed.
    pub inputs: Vec<String>,

    /// Requested output dimension, for models that support shortening.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The embedding vectors, one per input text.
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used.
    pub model: String,

    /// Token usage.
    pub usage: Option<Usage>,
}

/// The core Provider trait.
///
/// Every vendor backend implements this trait. The agent loop calls
/// `stream()` without knowing which vendor is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "deepseek").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and replays the result as a
    /// finished one-shot stream, so callers never need a separate code path.
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let response = self.complete(request).await?;
        Ok(ChunkStream::from_chunks(one_shot_chunks(response)))
    }

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "provider '{}' does not support embeddings",
            self.name()
        )))
    }
}

/// Split a complete response into the chunk sequence a stream would produce.
///
/// A leading `<thinking>…</thinking>` block becomes a reasoning chunk.
pub fn one_shot_chunks(response: ProviderResponse) -> Vec<StreamChunk> {
    let mut chunks = Vec::with_capacity(3);
    let content = response.message.content;
    let body = match split_thinking(&content) {
        Some((reasoning, rest)) => {
            chunks.push(StreamChunk::Reasoning {
                text: reasoning.to_string(),
            });
            rest.to_string()
        }
        None => content,
    };
    chunks.push(StreamChunk::Text { text: body });
    if let Some(usage) = response.usage {
        chunks.push(StreamChunk::Usage { usage });
    }
    chunks
}

fn split_thinking(content: &str) -> Option<(&str, &str)> {
    let rest = content.trim_start().strip_prefix("<thinking>")?;
    let end = rest.find("</thinking>")?;
    Some((&rest[..end], rest[end + "</thinking>".len()..].trim_start()))
}
