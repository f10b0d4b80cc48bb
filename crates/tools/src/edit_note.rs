//! Replace an exact passage inside a note.

use crate::args;
use crate::workspace;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;

pub struct EditNoteTool;

#[async_trait]
impl Tool for EditNoteTool {
    fn name(&self) -> &str {
        "edit_note"
    }

    fn description(&self) -> &str {
        "Replace the first exact occurrence of old_string with new_string in a note. \
         Read the note first so old_string matches character for character."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Note path relative to the workspace" },
                "old_string": { "type": "string", "description": "Exact text to replace" },
                "new_string": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let path = args::required_text(params, &["path"])?;
        let old = args::raw_text(params, "old_string")
            .or_else(|| args::raw_text(params, "original"))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'old_string' parameter".into()))?;
        let new = args::raw_text(params, "new_string")
            .or_else(|| args::raw_text(params, "modified"))
            .ok_or_else(|| ToolError::InvalidArguments("missing 'new_string' parameter".into()))?;

        let full = workspace::resolve(ctx, &path)?;
        let content = tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("cannot read {path}: {e}")))?;

        if !content.contains(&old) {
            return Err(ToolError::failed(
                self.name(),
                format!("text to replace was not found in {path}; read the note and copy it exactly"),
            ));
        }

        let updated = content.replacen(&old, &new, 1);
        tokio::fs::write(&full, updated)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("cannot write {path}: {e}")))?;

        tracing::info!(path = %path, "note edited");
        Ok(ToolResult::completed(format!("Edited {path}")))
    }
}
