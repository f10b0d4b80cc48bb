//! Create a new note.

use crate::args;
use crate::workspace;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;

pub struct CreateNoteTool;

#[async_trait]
impl Tool for CreateNoteTool {
    fn name(&self) -> &str {
        "create_note"
    }

    fn description(&self) -> &str {
        "Create a new note. Parent folders are created as needed; existing notes are never overwritten."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "New note path, e.g. projects/idea.md" },
                "content": { "type": "string", "description": "Full markdown content" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let path = args::required_text(params, &["path"])?;
        let content = args::raw_text(params, "content").unwrap_or_default();

        let full = workspace::resolve(ctx, &path)?;
        if tokio::fs::try_exists(&full).await.unwrap_or(false) {
            return Err(ToolError::failed(
                self.name(),
                format!("{path} already exists; use edit_note to change it"),
            ));
        }

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::failed(self.name(), format!("cannot create folder: {e}")))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("cannot write {path}: {e}")))?;

        tracing::info!(path = %path, "note created");
        Ok(ToolResult::completed(format!("Created {path}")))
    }
}
