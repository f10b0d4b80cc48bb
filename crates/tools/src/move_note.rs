//! Move or rename a note.

use crate::args;
use crate::workspace;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;

pub struct MoveNoteTool;

#[async_trait]
impl Tool for MoveNoteTool {
    fn name(&self) -> &str {
        "move_note"
    }

    fn description(&self) -> &str {
        "Move or rename a note. Target folders are created as needed."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "from_path": { "type": "string", "description": "Current note path" },
                "to_path": { "type": "string", "description": "New note path" }
            },
            "required": ["from_path", "to_path"]
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let from = args::required_text(params, &["from_path", "from"])?;
        let to = args::required_text(params, &["to_path", "to"])?;

        let source = workspace::resolve(ctx, &from)?;
        let target = workspace::resolve(ctx, &to)?;

        if !source.is_file() {
            return Err(ToolError::failed(self.name(), format!("{from} does not exist")));
        }
        if target.exists() {
            return Err(ToolError::failed(self.name(), format!("{to} already exists")));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::failed(self.name(), format!("cannot create folder: {e}")))?;
        }
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("cannot move {from}: {e}")))?;

        tracing::info!(from = %from, to = %to, "note moved");
        Ok(ToolResult::completed(format!("Moved {from} to {to}")))
    }
}
