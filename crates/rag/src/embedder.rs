//! Embedders: offline feature hashing and provider-backed embeddings.

use crate::chunker::is_cjk;
use async_trait::async_trait;
use lumina_core::error::RetrievalError;
use lumina_core::provider::{EmbeddingRequest, Provider};
use lumina_core::retrieval::Embedder;
use std::sync::Arc;
use tracing::debug;

/// Deterministic, offline embedder using signed feature hashing.
///
/// Each lowercase word (and each CJK character) is hashed with FNV-1a into
/// one of `dimensions` buckets; the result is L2-normalized. Texts sharing
/// vocabulary get high cosine similarity, which is enough for keyword-ish
/// semantic search without a network dependency.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for term in terms(text) {
            let hash = fnv1a(term.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        crate::vector::normalize(&mut vector);
        vector
    }
}

/// Lowercase word and CJK-character terms of `text`.
pub(crate) fn terms(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                out.push(std::mem::take(&mut word));
            }
            out.push(c.to_string());
        } else if c.is_alphanumeric() || c == '_' {
            word.extend(c.to_lowercase());
        } else if !word.is_empty() {
            out.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        out.push(word);
    }
    out
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Embeddings from a provider's `/embeddings` endpoint, in batches.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, dimensions: usize, batch_size: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            dimensions,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(
                provider = %self.provider.name(),
                model = %self.model,
                count = batch.len(),
                "embedding batch"
            );
            let response = self
                .provider
                .embed(EmbeddingRequest {
                    model: self.model.clone(),
                    inputs: batch.to_vec(),
                    dimensions: Some(self.dimensions),
                })
                .await
                .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

            if response.embeddings.len() != batch.len() {
                return Err(RetrievalError::EmbeddingFailed(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            for vector in response.embeddings {
                if vector.len() != self.dimensions {
                    return Err(RetrievalError::DimensionMismatch {
                        expected: self.dimensions,
                        actual: vector.len(),
                    });
                }
                vectors.push(vector);
            }
        }
        Ok(vectors)
    }
}
