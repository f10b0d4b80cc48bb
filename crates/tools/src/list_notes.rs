//! List folder contents.

use crate::args;
use crate::workspace::{self, is_hidden};
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;
use walkdir::WalkDir;

pub struct ListNotesTool;

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "list_notes"
    }

    fn description(&self) -> &str {
        "List notes and folders in a workspace folder, optionally recursively."
    }

    fn requires_approval(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Folder relative to the workspace (default: root)" },
                "recursive": { "type": "boolean", "description": "Include subfolders" },
                "max_depth": { "type": "integer", "description": "Depth limit when recursive (default 3)" }
            }
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let path = args::optional_text(params, &["path"]).unwrap_or_else(|| ".".into());
        let recursive = args::optional_bool(params, "recursive").unwrap_or(false);
        let max_depth = if recursive {
            args::optional_u64(params, "max_depth").unwrap_or(3).max(1) as usize
        } else {
            1
        };

        let base = workspace::resolve(ctx, &path)?;
        if !base.is_dir() {
            return Err(ToolError::failed(self.name(), format!("{path} is not a folder")));
        }

        let entries = tokio::task::spawn_blocking(move || {
            let mut entries: Vec<String> = WalkDir::new(&base)
                .max_depth(max_depth)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()))
                .filter_map(Result::ok)
                .filter(|e| e.depth() > 0)
                .map(|e| {
                    let suffix = if e.file_type().is_dir() { "/" } else { "" };
                    if recursive {
                        let indent = "  ".repeat(e.depth() - 1);
                        format!("{indent}{}{suffix}", workspace::relative(&base, e.path()))
                    } else {
                        format!("{}{suffix}", e.file_name().to_string_lossy())
                    }
                })
                .collect();
            if !recursive {
                entries.sort();
            }
            entries
        })
        .await
        .map_err(|e| ToolError::failed("list_notes", e))?;

        if entries.is_empty() {
            return Ok(ToolResult::completed("(empty directory)"));
        }
        Ok(ToolResult::completed(entries.join("\n")))
    }
}
