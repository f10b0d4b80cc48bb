//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, Anthropic and Gemini (via their compatibility
//! endpoints), Moonshot, DeepSeek, Groq, OpenRouter, Ollama, and any other
//! OpenAI-compatible endpoint.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Reasoning deltas (`reasoning_content`) surfaced as reasoning chunks
//! - Embeddings

use async_trait::async_trait;
use futures::StreamExt;
use lumina_core::error::ProviderError;
use lumina_core::message::{Message, Role};
use lumina_core::provider::*;
use lumina_core::stream::{self, ChunkSender, ChunkStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
///
/// This handles every supported vendor since each exposes an
/// OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    poll_interval: Duration,
    idle_timeout: Option<Duration>,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            poll_interval: stream::DEFAULT_POLL_INTERVAL,
            idle_timeout: None,
        })
    }

    /// Configure how the returned chunk streams poll and when they give up.
    pub fn with_stream_timing(mut self, poll_interval: Duration, idle_timeout: Option<Duration>) -> Self {
        self.poll_interval = poll_interval;
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: Some(m.content.clone()),
                reasoning_content: None,
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        body
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        accept_sse: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/{path}", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if accept_sse {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl lumina_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = Self::request_body(&request, false);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self.post("chat/completions", &body, false).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let content = merge_reasoning(
            choice.message.reasoning_content.as_deref(),
            choice.message.content.as_deref().unwrap_or_default(),
        );

        Ok(ProviderResponse {
            message: Message::assistant(content),
            usage: api_response.usage.map(Usage::from),
            model: api_response.model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let body = Self::request_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.post("chat/completions", &body, true).await?;

        let (tx, rx) = stream::channel(stream::DEFAULT_CAPACITY);
        let provider_name = self.name.clone();

        // Read the SSE byte stream on its own task and push decoded chunks
        tokio::spawn(async move {
            pump_sse(response, tx, provider_name).await;
        });

        Ok(rx
            .with_poll_interval(self.poll_interval)
            .with_idle_timeout(self.idle_timeout))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        let mut body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });
        if let Some(dimensions) = request.dimensions {
            body["dimensions"] = serde_json::json!(dimensions);
        }

        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self.post("embeddings", &body, false).await?;

        let api_resp: EmbeddingApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        let mut data = api_resp.data;
        data.sort_by_key(|d| d.index);
        let embeddings = data.into_iter().map(|d| d.embedding).collect();

        let usage = api_resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings,
            model: api_resp.model,
            usage,
        })
    }
}

/// Prefix visible content with the model's reasoning, if any.
fn merge_reasoning(reasoning: Option<&str>, content: &str) -> String {
    match reasoning.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reasoning) => format!("<thinking>{reasoning}</thinking>\n{content}"),
        None => content.to_string(),
    }
}

/// Forward an SSE response body into `tx` until `[DONE]`, EOF, or the
/// consumer goes away. Always marks the stream finished.
async fn pump_sse(response: reqwest::Response, tx: ChunkSender, provider_name: String) {
    let mut byte_stream = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(chunk_result) = byte_stream.next().await {
        let bytes = match chunk_result {
            Ok(b) => b,
            Err(e) => {
                tx.fail(ProviderError::StreamInterrupted(e.to_string())).await;
                return;
            }
        };

        for event in decoder.push(&bytes) {
            match event {
                SseEvent::Done => {
                    tx.finish();
                    return;
                }
                SseEvent::Chunk(chunk) => {
                    if !tx.send(chunk).await {
                        return; // receiver dropped
                    }
                }
                SseEvent::Unparseable { data, error } => {
                    trace!(
                        provider = %provider_name,
                        data = %data,
                        error = %error,
                        "Ignoring unparseable SSE chunk"
                    );
                }
            }
        }
    }

    // Stream ended without [DONE]
    tx.finish();
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Chunk(StreamChunk),
    Done,
    Unparseable { data: String, error: String },
}

/// Incremental decoder for `data: {...}` lines split across network reads.
///
/// Bytes are buffered until a full line arrives, so a multibyte character
/// split between two reads is decoded intact.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let decoded = String::from_utf8_lossy(&raw[..line_end]);
            let line = decoded.trim_end_matches('\r');

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                events.push(SseEvent::Done);
                continue;
            }

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(resp) => events.extend(resp.into_chunks().into_iter().map(SseEvent::Chunk)),
                Err(e) => events.push(SseEvent::Unparseable {
                    data: data.to_string(),
                    error: e.to_string(),
                }),
            }
        }
        events
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: String,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

impl StreamResponse {
    fn into_chunks(self) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        if let Some(choice) = self.choices.into_iter().next() {
            if let Some(text) = choice.delta.reasoning_content.filter(|t| !t.is_empty()) {
                chunks.push(StreamChunk::Reasoning { text });
            }
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                chunks.push(StreamChunk::Text { text });
            }
        }
        if let Some(usage) = self.usage {
            chunks.push(StreamChunk::Usage {
                usage: usage.into(),
            });
        }
        chunks
    }
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumina_core::Provider;

    fn provider(name: &str, base_url: &str) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(name, base_url, "sk-test", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn constructor_trims_trailing_slash() {
        let provider = provider("openrouter", "https://openrouter.ai/api/v1/");
        assert_eq!(provider.name(), "openrouter");
        assert_eq!(provider.base_url(), "https://openrouter.ai/api/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn request_body_has_no_tools() {
        let mut request = ProviderRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        request.max_tokens = Some(256);
        let body = OpenAiCompatProvider::request_body(&request, true);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn reasoning_is_wrapped_in_thinking() {
        assert_eq!(
            merge_reasoning(Some("check notes first"), "Done."),
            "<thinking>check notes first</thinking>\nDone."
        );
        assert_eq!(merge_reasoning(Some("  "), "Done."), "Done.");
        assert_eq!(merge_reasoning(None, "Done."), "Done.");
    }

    // --- SSE parsing tests ---

    #[test]
    fn decode_content_delta() {
        let mut decoder = SseDecoder::default();
        let events =
            decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}]}\n\n");
        assert_eq!(
            events,
            vec![SseEvent::Chunk(StreamChunk::Text {
                text: "Hello".into()
            })]
        );
    }

    #[test]
    fn decode_line_split_across_reads() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let events = decoder.push(b"tent\":\"lo\"}}]}\r\n");
        assert_eq!(
            events,
            vec![SseEvent::Chunk(StreamChunk::Text { text: "lo".into() })]
        );
    }

    #[test]
    fn decode_multibyte_char_split_across_reads() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"日记\"}}]}\n".as_bytes();
        let cut = line.iter().position(|&b| b == 0xE6).unwrap() + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&line[..cut]).is_empty());
        let events = decoder.push(&line[cut..]);
        assert_eq!(
            events,
            vec![SseEvent::Chunk(StreamChunk::Text { text: "日记".into() })]
        );
    }

    #[test]
    fn decode_reasoning_delta() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm\",\"content\":\"\"}}]}\n",
        );
        assert_eq!(
            events,
            vec![SseEvent::Chunk(StreamChunk::Reasoning { text: "hmm".into() })]
        );
    }

    #[test]
    fn decode_usage_and_done() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(
            b": keep-alive\ndata: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\ndata: [DONE]\n",
        );
        assert_eq!(
            events,
            vec![
                SseEvent::Chunk(StreamChunk::Usage {
                    usage: Usage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                        total_tokens: 15
                    }
                }),
                SseEvent::Done,
            ]
        );
    }

    #[test]
    fn decode_garbage_is_reported_not_fatal() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: {not json}\n");
        assert!(matches!(events[0], SseEvent::Unparseable { .. }));
    }

    #[test]
    fn parse_empty_delta() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.into_chunks().is_empty());
    }

    #[test]
    fn parse_embedding_response_in_index_order() {
        let data = r#"{
            "data": [
                {"embedding": [0.4, 0.5, 0.6], "index": 1},
                {"embedding": [0.1, 0.2, 0.3], "index": 0}
            ],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        let mut items = parsed.data;
        items.sort_by_key(|d| d.index);
        assert_eq!(items[0].embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(parsed.model, "text-embedding-3-small");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let provider = provider("ollama", "http://127.0.0.1:9/v1");
        let err = provider
            .complete(ProviderRequest::new("llama3", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Network(_) | ProviderError::Timeout(_)));
    }
}
