//! Configuration loading, validation, and management for Lumina.
//!
//! Loads configuration from `~/.lumina/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use lumina_core::agent::{AgentConfig, AgentMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.lumina/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default workspace (falls back to the current directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,

    /// Chat model provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSection,

    /// Tool outcome rendering
    #[serde(default)]
    pub parser: ParserConfig,

    /// Retrieval (chunking, embeddings, reranking)
    #[serde(default)]
    pub rag: RagConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("workspace", &self.workspace)
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("parser", &self.parser)
            .field("rag", &self.rag)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Vendor name: openai, anthropic, gemini, moonshot, deepseek, groq, openrouter, ollama
    #[serde(default = "default_provider")]
    pub name: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Overrides the vendor's default endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How often the stream consumer re-checks for completion
    #[serde(default = "default_stream_poll_interval_ms")]
    pub stream_poll_interval_ms: u64,

    /// Give up on a stream after this long without data
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_stream_poll_interval_ms() -> u64 {
    100
}
fn default_stream_idle_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            stream_poll_interval_ms: default_stream_poll_interval_ms(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("stream_poll_interval_ms", &self.stream_poll_interval_ms)
            .field("stream_idle_timeout_secs", &self.stream_idle_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    #[serde(default = "default_max_plan_iterations")]
    pub max_plan_iterations: u32,

    #[serde(default)]
    pub auto_approve: bool,

    #[serde(default)]
    pub mode: AgentMode,

    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_max_steps() -> u32 {
    10
}
fn default_max_plan_iterations() -> u32 {
    3
}
fn default_locale() -> String {
    "en".into()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_plan_iterations: default_max_plan_iterations(),
            auto_approve: false,
            mode: AgentMode::default(),
            locale: default_locale(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Tool output longer than this many characters is truncated
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,

    /// Appended after truncated output; `{length}` is the original length
    #[serde(default = "default_truncation_marker")]
    pub truncation_marker: String,
}

fn default_max_result_chars() -> usize {
    8000
}
fn default_truncation_marker() -> String {
    "... content truncated (original length: {length})".into()
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_result_chars: default_max_result_chars(),
            truncation_marker: default_truncation_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_min_score")]
    pub min_score: f32,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub reranker: RerankerConfig,
}

fn default_true() -> bool {
    true
}
fn default_max_results() -> usize {
    10
}
fn default_min_score() -> f32 {
    0.3
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: default_max_results(),
            min_score: default_min_score(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            reranker: RerankerConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `hash` (offline) or a vendor with an embeddings endpoint
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_provider() -> String {
    "hash".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_dimensions() -> usize {
    384
}
fn default_batch_size() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: None,
            base_url: None,
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("dimensions", &self.dimensions)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_max_tokens")]
    pub max_tokens: usize,

    /// Sections smaller than this are merged into the next one
    #[serde(default = "default_chunk_min_tokens")]
    pub min_tokens: usize,

    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

fn default_chunk_max_tokens() -> usize {
    500
}
fn default_chunk_min_tokens() -> usize {
    50
}
fn default_overlap_tokens() -> usize {
    50
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_chunk_max_tokens(),
            min_tokens: default_chunk_min_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default)]
    pub enabled: bool,

    /// `lexical` (offline) or `http`
    #[serde(default = "default_reranker_provider")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Candidates fetched per requested result while reranking
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,

    /// Minimum candidate count while reranking
    #[serde(default = "default_oversample_floor")]
    pub oversample_floor: usize,
}

fn default_reranker_provider() -> String {
    "lexical".into()
}
fn default_oversample_factor() -> usize {
    3
}
fn default_oversample_floor() -> usize {
    20
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_reranker_provider(),
            model: None,
            api_key: None,
            base_url: None,
            oversample_factor: default_oversample_factor(),
            oversample_floor: default_oversample_floor(),
        }
    }
}

impl RerankerConfig {
    /// Candidate count to fetch for `limit` final results.
    pub fn candidate_count(&self, limit: usize) -> usize {
        limit
            .saturating_mul(self.oversample_factor)
            .max(self.oversample_floor)
    }
}

impl std::fmt::Debug for RerankerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RerankerConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("oversample_factor", &self.oversample_factor)
            .field("oversample_floor", &self.oversample_floor)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path.
    ///
    /// Priority:
    /// 1. Environment variables (LUMINA_API_KEY, LUMINA_PROVIDER, ...)
    /// 2. Config file (~/.lumina/config.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::read_file(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("LUMINA_PROVIDER") {
            self.provider.name = provider;
        }
        if let Some(model) = lookup("LUMINA_MODEL") {
            self.provider.model = model;
        }
        if let Some(base_url) = lookup("LUMINA_BASE_URL") {
            self.provider.base_url = Some(base_url);
        }

        if let Some(key) = lookup("LUMINA_API_KEY") {
            self.provider.api_key = Some(key);
        } else if self.provider.api_key.is_none() {
            let vendor_var = format!("{}_API_KEY", self.provider.name.to_ascii_uppercase());
            self.provider.api_key = lookup(&vendor_var);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lumina")
    }

    /// Workspace to operate on: configured, or the current directory.
    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.into()));

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return invalid("provider.temperature must be between 0.0 and 2.0");
        }
        if self.agent.max_steps == 0 {
            return invalid("agent.max_steps must be at least 1");
        }
        if self.parser.max_result_chars == 0 {
            return invalid("parser.max_result_chars must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.rag.min_score) {
            return invalid("rag.min_score must be between 0.0 and 1.0");
        }
        if self.rag.embedding.dimensions == 0 {
            return invalid("rag.embedding.dimensions must be at least 1");
        }
        if self.rag.embedding.batch_size == 0 {
            return invalid("rag.embedding.batch_size must be at least 1");
        }
        if self.rag.chunking.overlap_tokens >= self.rag.chunking.max_tokens {
            return invalid("rag.chunking.overlap_tokens must be smaller than max_tokens");
        }
        if self.rag.reranker.oversample_factor == 0 {
            return invalid("rag.reranker.oversample_factor must be at least 1");
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Agent settings for one task, combining the provider and agent sections.
    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.provider.model.clone(),
            temperature: self.provider.temperature,
            max_tokens: Some(self.provider.max_tokens),
            max_steps: self.agent.max_steps,
            max_plan_iterations: self.agent.max_plan_iterations,
            auto_approve: self.agent.auto_approve,
            mode: self.agent.mode,
            locale: self.agent.locale.clone(),
        }
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
