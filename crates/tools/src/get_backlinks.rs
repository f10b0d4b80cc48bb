//! Find notes that link to a given note with `[[wiki links]]`.

use crate::args;
use crate::workspace;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;
use regex::Regex;
use std::path::Path;

const CONTEXT_LINES: usize = 2;

pub struct GetBacklinksTool;

#[async_trait]
impl Tool for GetBacklinksTool {
    fn name(&self) -> &str {
        "get_backlinks"
    }

    fn description(&self) -> &str {
        "List the notes that link to a note via [[note name]] or [[note name|alias]]."
    }

    fn requires_approval(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path (or name) of the linked note" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let path = args::required_text(params, &["path", "note_name"])?;
        let target = path.trim_end_matches(".md");
        let note_name = Path::new(target)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ToolError::InvalidArguments(format!("invalid note path '{path}'")))?;

        let pattern = format!(r"\[\[{}(\|[^\]]+)?\]\]", regex::escape(&note_name));
        let link = Regex::new(&pattern).map_err(|e| ToolError::failed(self.name(), e))?;

        let mut backlinks = Vec::new();
        for note in workspace::markdown_files(&ctx.workspace_path, &ctx.workspace_path).await? {
            if note.rel_path.trim_end_matches(".md") == target {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(&note.abs_path).await else {
                continue;
            };

            let lines: Vec<String> = content
                .lines()
                .enumerate()
                .filter(|(_, line)| link.is_match(line))
                .take(CONTEXT_LINES)
                .map(|(i, line)| format!("  Line {}: {}", i + 1, line.trim()))
                .collect();
            if !lines.is_empty() {
                backlinks.push(format!("{}\n{}", note.rel_path, lines.join("\n")));
            }
        }

        if backlinks.is_empty() {
            return Ok(ToolResult::completed(format!("No backlinks found for '{note_name}'")));
        }
        Ok(ToolResult::completed(format!(
            "Found {} notes linking to '{note_name}':\n\n{}",
            backlinks.len(),
            backlinks.join("\n\n")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{params, workspace_with};

    #[tokio::test]
    async fn finds_plain_and_aliased_links() {
        let (_dir, ctx) = workspace_with(&[
            ("projects/rust.md", "# Rust\nsee [[tokio]]"),
            ("tokio.md", "# Tokio\nrelated: [[tokio]] self link"),
            ("daily/monday.md", "read [[tokio|the runtime]] docs\nnothing\n[[tokio]] again\n[[tokio]] third"),
            ("cake.md", "[[tokionese]] is not a match"),
        ]);
        let result = GetBacklinksTool
            .execute(&params(&[("path", "tokio.md")]), &ctx)
            .await
            .unwrap();
        let text = result.text();
        assert!(text.starts_with("Found 2 notes linking to 'tokio'"));
        assert!(text.contains("projects/rust.md\n  Line 2: see [[tokio]]"));
        assert!(text.contains("daily/monday.md\n  Line 1: read [[tokio|the runtime]] docs\n  Line 3"));
        assert!(!text.contains("Line 4"));
        assert!(!text.contains("cake.md"));
    }

    #[tokio::test]
    async fn no_backlinks() {
        let (_dir, ctx) = workspace_with(&[("lonely.md", "alone")]);
        let result = GetBacklinksTool
            .execute(&params(&[("path", "lonely.md")]), &ctx)
            .await
            .unwrap();
        assert_eq!(result.text(), "No backlinks found for 'lonely'");
    }
}
