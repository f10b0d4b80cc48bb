//! Delete a note by moving it to the workspace trash.

use crate::args;
use crate::workspace;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;
use lumina_rag::DATA_DIR;

/// Trash folder inside the private data directory.
pub const TRASH_DIR: &str = "trash";

pub struct DeleteNoteTool;

#[async_trait]
impl Tool for DeleteNoteTool {
    fn name(&self) -> &str {
        "delete_note"
    }

    fn description(&self) -> &str {
        "Delete a note. The file is moved to the workspace trash and can be restored by the user."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Note path relative to the workspace" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let path = args::required_text(params, &["path"])?;
        let source = workspace::resolve(ctx, &path)?;
        if !source.is_file() {
            return Err(ToolError::failed(self.name(), format!("{path} does not exist")));
        }

        let trash = ctx.workspace_path.join(DATA_DIR).join(TRASH_DIR);
        tokio::fs::create_dir_all(&trash)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("cannot create trash: {e}")))?;

        // Flatten the path and prefix a timestamp so repeated deletes never collide
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
        let target = trash.join(format!("{stamp}_{}", path.replace(['/', '\\'], "_")));
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("cannot delete {path}: {e}")))?;

        tracing::info!(path = %path, "note moved to trash");
        Ok(ToolResult::completed(format!("Deleted {path} (moved to trash)")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{params, workspace_with};

    #[tokio::test]
    async fn moves_note_to_trash() {
        let (dir, ctx) = workspace_with(&[("old/draft.md", "bye")]);
        let result = DeleteNoteTool
            .execute(&params(&[("path", "old/draft.md")]), &ctx)
            .await
            .unwrap();
        assert!(result.text().contains("moved to trash"));
        assert!(!dir.path().join("old/draft.md").exists());

        let trashed: Vec<_> = std::fs::read_dir(dir.path().join(".lumina/trash"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(trashed.len(), 1);
        assert!(trashed[0].ends_with("old_draft.md"));
    }

    #[tokio::test]
    async fn missing_note_fails() {
        let (_dir, ctx) = workspace_with(&[]);
        assert!(DeleteNoteTool.execute(&params(&[("path", "x.md")]), &ctx).await.is_err());
    }
}
