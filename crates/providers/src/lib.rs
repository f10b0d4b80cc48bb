//! LLM Provider implementations for Lumina.
//!
//! All providers implement the `lumina_core::Provider` trait.
//! The factory selects and configures the vendor from configuration.

pub mod factory;
pub mod openai_compat;

pub use factory::{
    SUPPORTED_PROVIDERS, create_embedding_provider, create_provider, default_base_url, is_supported,
};
pub use openai_compat::OpenAiCompatProvider;
