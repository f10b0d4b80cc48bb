//! Read one or more notes with line numbers.

use crate::args;
use crate::workspace;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;

pub struct ReadNoteTool;

/// `   1 | first line` numbering used for every read.
pub(crate) fn number_lines(content: &str) -> String {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:4} | {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for ReadNoteTool {
    fn name(&self) -> &str {
        "read_note"
    }

    fn description(&self) -> &str {
        "Read the full content of one or more notes. Lines are numbered."
    }

    fn requires_approval(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Note path relative to the workspace" },
                "paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Several note paths to read at once"
                }
            }
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let paths = match args::text_list(params, "paths").filter(|p| !p.is_empty()) {
            Some(paths) => paths,
            None => vec![args::required_text(params, &["path"])?],
        };

        if let [path] = paths.as_slice() {
            let full = workspace::resolve(ctx, path)?;
            let content = tokio::fs::read_to_string(&full)
                .await
                .map_err(|e| ToolError::failed(self.name(), format!("cannot read {path}: {e}")))?;
            return Ok(ToolResult::completed(number_lines(&content)));
        }

        let mut sections = Vec::with_capacity(paths.len());
        let mut read_any = false;
        for path in &paths {
            let body = match workspace::resolve(ctx, path) {
                Ok(full) => match tokio::fs::read_to_string(&full).await {
                    Ok(content) => {
                        read_any = true;
                        number_lines(&content)
                    }
                    Err(e) => format!("(cannot read: {e})"),
                },
                Err(e) => format!("({e})"),
            };
            sections.push(format!("=== {path} ===\n{body}"));
        }

        if !read_any {
            return Err(ToolError::failed(
                self.name(),
                format!("none of the notes could be read: {}", paths.join(", ")),
            ));
        }
        Ok(ToolResult::completed(sections.join("\n\n")))
    }
}
