//! Add a row to a note database by writing a new note.

use crate::args;
use crate::query_database::load_schema;
use crate::workspace;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;

pub struct AddDatabaseRowTool;

/// File-name-safe form of a row title.
fn safe_title(title: &str) -> String {
    title.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}

#[async_trait]
impl Tool for AddDatabaseRowTool {
    fn name(&self) -> &str {
        "add_database_row"
    }

    fn description(&self) -> &str {
        "Add a row to a note database. Creates a note whose frontmatter holds the cell values."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "database_id": { "type": "string", "description": "Database id" },
                "title": { "type": "string", "description": "Row title, also the note name" },
                "cells": { "type": "object", "description": "Column/value pairs" }
            },
            "required": ["database_id", "title"]
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let database_id = args::required_text(params, &["database_id"])?;
        let title = args::required_text(params, &["title"])?;

        let schema = load_schema(ctx, self.name(), &database_id).await?;

        let mut frontmatter = format!("---\ndb: {database_id}\ntitle: {title}\n");
        if let Some(cells) = params.get("cells").and_then(|c| c.as_object()) {
            for (key, value) in cells {
                if !schema.columns.iter().any(|c| &c.name == key) {
                    tracing::debug!(database = %database_id, column = %key, "cell for unknown column");
                }
                frontmatter.push_str(&format!("{key}: {}\n", value.to_text()));
            }
        }
        frontmatter.push_str("---\n\n");

        let note_path = format!("{}.md", safe_title(&title));
        let full = workspace::resolve(ctx, &note_path)?;
        if full.exists() {
            return Err(ToolError::failed(self.name(), format!("note '{note_path}' already exists")));
        }

        tokio::fs::write(&full, format!("{frontmatter}# {title}\n"))
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("cannot create {note_path}: {e}")))?;

        tracing::info!(database = %database_id, path = %note_path, "database row added");
        Ok(ToolResult::completed(format!(
            "Added row '{title}' to database '{database_id}' ({note_path})"
        )))
    }
}
