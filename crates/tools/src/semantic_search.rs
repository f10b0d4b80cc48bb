//! Meaning-based search through the retrieval index.

use crate::args;
use async_trait::async_trait;
use lumina_core::error::{RetrievalError, ToolError};
use lumina_core::retrieval::SearchOptions;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;
use lumina_rag::RagManager;
use std::sync::Arc;

pub struct SemanticSearchTool {
    rag: Option<Arc<RagManager>>,
}

impl SemanticSearchTool {
    pub fn new(rag: Option<Arc<RagManager>>) -> Self {
        Self { rag }
    }
}

#[async_trait]
impl Tool for SemanticSearchTool {
    fn name(&self) -> &str {
        "semantic_search"
    }

    fn description(&self) -> &str {
        "Find note passages related in meaning to a query, even without shared keywords."
    }

    fn requires_approval(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look for, in natural language" },
                "limit": { "type": "integer", "description": "Maximum passages (default 10)" },
                "min_score": { "type": "number", "description": "Similarity floor in [0, 1] (default 0.3)" },
                "directory": { "type": "string", "description": "Only search under this folder" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: &Params, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let query = args::required_text(params, &["query"])?;
        let rag = self
            .rag
            .as_ref()
            .ok_or_else(|| ToolError::failed(self.name(), RetrievalError::NotInitialized))?;

        let defaults = rag.default_options();
        let options = SearchOptions {
            limit: args::optional_u64(params, "limit")
                .map(|l| l.max(1) as usize)
                .unwrap_or(defaults.limit),
            min_score: args::optional_f64(params, "min_score")
                .map(|s| s.clamp(0.0, 1.0) as f32)
                .unwrap_or(defaults.min_score),
            directory: args::optional_text(params, &["directory"]),
        };

        let results = rag
            .search(&query, &options)
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;

        if results.is_empty() {
            return Ok(ToolResult::completed(format!("No passages related to '{query}'")));
        }

        let blocks: Vec<String> = results
            .iter()
            .map(|r| {
                let heading = r
                    .heading
                    .as_deref()
                    .map(|h| format!(" [{h}]"))
                    .unwrap_or_default();
                format!(
                    "{}:{}-{} ({:.2}){heading}\n{}",
                    r.file_path, r.start_line, r.end_line, r.score, r.content
                )
            })
            .collect();

        Ok(ToolResult::completed(format!(
            "Found {} related passages:\n\n{}",
            results.len(),
            blocks.join("\n\n---\n\n")
        )))
    }
}
