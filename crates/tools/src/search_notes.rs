//! Case-insensitive substring search across notes.

use crate::args;
use crate::workspace;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;

const LINES_PER_FILE: usize = 3;

pub struct SearchNotesTool;

#[async_trait]
impl Tool for SearchNotesTool {
    fn name(&self) -> &str {
        "search_notes"
    }

    fn description(&self) -> &str {
        "Find notes containing a word or phrase (case-insensitive). Shows up to 3 matching lines per note."
    }

    fn requires_approval(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Text to look for" },
                "limit": { "type": "integer", "description": "Maximum notes to return (default 10)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let query = args::required_text(params, &["query"])?;
        let limit = args::optional_u64(params, "limit").unwrap_or(10).max(1) as usize;
        let needle = query.to_lowercase();

        let notes = workspace::markdown_files(&ctx.workspace_path, &ctx.workspace_path).await?;
        let mut results = Vec::new();
        for note in notes {
            if results.len() >= limit {
                break;
            }
            let Ok(content) = tokio::fs::read_to_string(&note.abs_path).await else {
                continue;
            };

            let name_hit = note.rel_path.to_lowercase().contains(&needle);
            let lines: Vec<String> = content
                .lines()
                .enumerate()
                .filter(|(_, line)| line.to_lowercase().contains(&needle))
                .take(LINES_PER_FILE)
                .map(|(i, line)| format!("  Line {}: {}", i + 1, line.trim()))
                .collect();

            if name_hit || !lines.is_empty() {
                let mut block = note.rel_path.clone();
                for line in lines {
                    block.push('\n');
                    block.push_str(&line);
                }
                results.push(block);
            }
        }

        if results.is_empty() {
            return Ok(ToolResult::completed(format!("No notes found containing '{query}'")));
        }
        Ok(ToolResult::completed(format!(
            "Found {} notes:\n\n{}",
            results.len(),
            results.join("\n\n")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{params, workspace_with};

    #[tokio::test]
    async fn finds_matching_lines_case_insensitively() {
        let (_dir, ctx) = workspace_with(&[
            ("rust.md", "# Rust\nTokio runtime\nmore TOKIO\ntokio again\ntokio four"),
            ("cake.md", "flour and sugar"),
        ]);
        let result = SearchNotesTool
            .execute(&params(&[("query", "tokio")]), &ctx)
            .await
            .unwrap();
        let text = result.text();
        assert!(text.starts_with("Found 1 notes"));
        assert!(text.contains("rust.md\n  Line 2: Tokio runtime"));
        assert_eq!(text.matches("  Line ").count(), 3);
        assert!(!text.contains("cake.md"));
    }

    #[tokio::test]
    async fn reports_no_matches() {
        let (_dir, ctx) = workspace_with(&[("a.md", "nothing here")]);
        let result = SearchNotesTool
            .execute(&params(&[("query", "zebra")]), &ctx)
            .await
            .unwrap();
        assert_eq!(result.text(), "No notes found containing 'zebra'");
    }

    #[tokio::test]
    async fn respects_limit() {
        let (_dir, ctx) = workspace_with(&[("a.md", "x"), ("b.md", "x"), ("c.md", "x")]);
        let result = SearchNotesTool
            .execute(&params(&[("query", "x"), ("limit", "2")]), &ctx)
            .await
            .unwrap();
        assert!(result.text().starts_with("Found 2 notes"));
    }
}
