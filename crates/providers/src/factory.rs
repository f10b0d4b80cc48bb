//! Provider factory: builds the configured vendor or fails fast.
//!
//! Missing credentials and unknown vendors are rejected here, before any
//! network call is made.

use crate::openai_compat::OpenAiCompatProvider;
use lumina_config::{EmbeddingConfig, ProviderConfig};
use lumina_core::error::ProviderError;
use lumina_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;

/// Vendors reachable through the OpenAI-compatible implementation.
pub const SUPPORTED_PROVIDERS: &[&str] = &[
    "openai",
    "anthropic",
    "gemini",
    "moonshot",
    "deepseek",
    "groq",
    "openrouter",
    "ollama",
];

pub fn is_supported(name: &str) -> bool {
    SUPPORTED_PROVIDERS.contains(&name)
}

/// Get the default base URL for a supported vendor.
pub fn default_base_url(provider_name: &str) -> Option<&'static str> {
    let url = match provider_name {
        "openai" => "https://api.openai.com/v1",
        "anthropic" => "https://api.anthropic.com/v1",
        "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai",
        "moonshot" => "https://api.moonshot.cn/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        _ => return None,
    };
    Some(url)
}

/// Build the chat provider described by `config`.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider = build(
        &config.name,
        config.api_key.as_deref(),
        config.base_url.as_deref(),
        Duration::from_secs(config.request_timeout_secs),
    )?;

    let idle = (config.stream_idle_timeout_secs > 0)
        .then(|| Duration::from_secs(config.stream_idle_timeout_secs));
    let provider = provider.with_stream_timing(Duration::from_millis(config.stream_poll_interval_ms), idle);

    tracing::debug!(provider = %config.name, base_url = %provider.base_url(), "provider created");
    Ok(Arc::new(provider))
}

/// Build the provider serving the embeddings endpoint.
///
/// The chat provider's key is reused when both name the same vendor.
pub fn create_embedding_provider(
    embedding: &EmbeddingConfig,
    chat: &ProviderConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = embedding
        .api_key
        .as_deref()
        .or_else(|| (embedding.provider == chat.name).then_some(chat.api_key.as_deref()).flatten());

    let provider = build(
        &embedding.provider,
        api_key,
        embedding.base_url.as_deref(),
        Duration::from_secs(chat.request_timeout_secs),
    )?;
    Ok(Arc::new(provider))
}

fn build(
    name: &str,
    api_key: Option<&str>,
    base_url: Option<&str>,
    timeout: Duration,
) -> Result<OpenAiCompatProvider, ProviderError> {
    let default_url = default_base_url(name)
        .ok_or_else(|| ProviderError::Unsupported(format!(
            "'{name}' (supported: {})",
            SUPPORTED_PROVIDERS.join(", ")
        )))?;

    let api_key = match api_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => key.to_string(),
        // Local Ollama does not authenticate
        None if name == "ollama" => "ollama".to_string(),
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for '{name}'; set LUMINA_API_KEY or {}_API_KEY",
                name.to_ascii_uppercase()
            )));
        }
    };

    OpenAiCompatProvider::new(name, base_url.unwrap_or(default_url), api_key, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            name: name.into(),
            api_key: key.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn every_supported_vendor_has_a_base_url() {
        for name in SUPPORTED_PROVIDERS {
            assert!(default_base_url(name).is_some(), "{name}");
        }
        assert!(default_base_url("deepseek").unwrap().contains("api.deepseek.com"));
    }

    #[test]
    fn missing_key_fails_fast() {
        let err = create_provider(&config("deepseek", None)).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(err.to_string().contains("DEEPSEEK_API_KEY"));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let err = create_provider(&config("openai", Some("  "))).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn unknown_vendor_is_unsupported() {
        let err = create_provider(&config("acme-llm", Some("k"))).err().unwrap();
        assert!(matches!(err, ProviderError::Unsupported(_)));
        assert!(err.to_string().contains("openrouter"));
    }

    #[test]
    fn ollama_needs_no_key() {
        let provider = create_provider(&config("ollama", None)).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn configured_provider_is_created() {
        let provider = create_provider(&config("groq", Some("gsk-test"))).unwrap();
        assert_eq!(provider.name(), "groq");
    }

    #[test]
    fn embedding_provider_reuses_chat_key_for_same_vendor() {
        let chat = config("openai", Some("sk-test"));
        let embedding = EmbeddingConfig {
            provider: "openai".into(),
            ..Default::default()
        };
        assert!(create_embedding_provider(&embedding, &chat).is_ok());

        let other = EmbeddingConfig {
            provider: "gemini".into(),
            ..Default::default()
        };
        assert!(matches!(
            create_embedding_provider(&other, &chat).err().unwrap(),
            ProviderError::NotConfigured(_)
        ));
    }
}
