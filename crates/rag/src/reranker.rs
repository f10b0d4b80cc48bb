//! Second-pass rerankers.
//!
//! Rerankers reorder candidates; they do not rewrite the cosine `score`, so
//! the store's `min_score` floor keeps its meaning after reranking.

use crate::embedder::terms;
use async_trait::async_trait;
use lumina_core::error::RetrievalError;
use lumina_core::retrieval::{Reranker, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Pass-through used when reranking is turned off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledReranker;

#[async_trait]
impl Reranker for DisabledReranker {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn rerank(
        &self,
        _query: &str,
        candidates: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        Ok(candidates)
    }
}

/// Offline reranker: blends query-term overlap with the vector score.
#[derive(Debug, Clone)]
pub struct LexicalReranker {
    /// Weight of the lexical overlap in `[0, 1]`; the rest goes to the vector score
    lexical_weight: f32,
}

impl Default for LexicalReranker {
    fn default() -> Self {
        Self { lexical_weight: 0.5 }
    }
}

impl LexicalReranker {
    pub fn new(lexical_weight: f32) -> Self {
        Self {
            lexical_weight: lexical_weight.clamp(0.0, 1.0),
        }
    }

    /// Fraction of distinct query terms found in the candidate text.
    fn overlap(query_terms: &HashSet<String>, candidate: &SearchResult) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let mut text = candidate.content.clone();
        if let Some(heading) = &candidate.heading {
            text.push('\n');
            text.push_str(heading);
        }
        let doc_terms: HashSet<String> = terms(&text).into_iter().collect();
        let hits = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
        hits as f32 / query_terms.len() as f32
    }
}

#[async_trait]
impl Reranker for LexicalReranker {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let query_terms: HashSet<String> = terms(query).into_iter().collect();
        let mut scored: Vec<(f32, SearchResult)> = candidates
            .into_iter()
            .map(|c| {
                let blended = self.lexical_weight * Self::overlap(&query_terms, &c)
                    + (1.0 - self.lexical_weight) * c.score;
                (blended, c)
            })
            .collect();

        // Stable sort keeps vector order among ties
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }
}

/// Reranker backed by a hosted `/rerank` endpoint (Cohere/Jina style).
pub struct HttpReranker {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankHit>,
}

#[derive(Deserialize)]
struct RerankHit {
    index: usize,
    relevance_score: f32,
}

impl HttpReranker {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RetrievalError::QueryFailed(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }
}

/// Order `candidates` by `hits`; candidates the service left out keep their
/// relative order at the end.
fn apply_hits(candidates: Vec<SearchResult>, mut hits: Vec<RerankHit>) -> Vec<SearchResult> {
    hits.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut slots: Vec<Option<SearchResult>> = candidates.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());
    for hit in hits {
        if let Some(candidate) = slots.get_mut(hit.index).and_then(Option::take) {
            ordered.push(candidate);
        }
    }
    ordered.extend(slots.into_iter().flatten());
    ordered
}

#[async_trait]
impl Reranker for HttpReranker {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let body = RerankRequest {
            model: &self.model,
            query,
            documents: candidates.iter().map(|c| c.content.as_str()).collect(),
            top_n: candidates.len(),
        };

        let mut builder = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::QueryFailed(format!("rerank request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::QueryFailed(format!(
                "rerank endpoint returned {status}: {text}"
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::QueryFailed(format!("rerank response: {e}")))?;

        debug!(candidates = candidates.len(), hits = parsed.results.len(), "reranked");
        Ok(apply_hits(candidates, parsed.results))
    }
}
