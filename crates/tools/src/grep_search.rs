//! Regular-expression search across notes.

use crate::args;
use crate::workspace;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;
use regex::RegexBuilder;

const LINES_PER_FILE: usize = 5;

pub struct GrepSearchTool;

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Search notes with a regular expression. Shows up to 5 matching lines per note."
    }

    fn requires_approval(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression" },
                "path": { "type": "string", "description": "Folder to search (default: whole workspace)" },
                "case_sensitive": { "type": "boolean", "description": "Default false" },
                "limit": { "type": "integer", "description": "Maximum notes to return (default 20)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let pattern = args::required_text(params, &["pattern", "query"])?;
        let path = args::optional_text(params, &["path", "directory"]).unwrap_or_else(|| ".".into());
        let case_sensitive = args::optional_bool(params, "case_sensitive").unwrap_or(false);
        let limit = args::optional_u64(params, "limit").unwrap_or(20).max(1) as usize;

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| ToolError::InvalidArguments(format!("invalid regex pattern: {e}")))?;

        let dir = workspace::resolve(ctx, &path)?;
        let notes = workspace::markdown_files(&ctx.workspace_path, &dir).await?;

        let mut results = Vec::new();
        for note in notes {
            if results.len() >= limit {
                break;
            }
            let Ok(content) = tokio::fs::read_to_string(&note.abs_path).await else {
                continue;
            };

            let lines: Vec<String> = content
                .lines()
                .enumerate()
                .filter(|(_, line)| regex.is_match(line))
                .take(LINES_PER_FILE)
                .map(|(i, line)| format!("  {}: {}", i + 1, line.trim()))
                .collect();
            if !lines.is_empty() {
                results.push(format!("{}\n{}", note.rel_path, lines.join("\n")));
            }
        }

        if results.is_empty() {
            return Ok(ToolResult::completed(format!("No matches found for pattern '{pattern}'")));
        }
        Ok(ToolResult::completed(format!(
            "Found {} files matching '{pattern}':\n\n{}",
            results.len(),
            results.join("\n\n")
        )))
    }
}
