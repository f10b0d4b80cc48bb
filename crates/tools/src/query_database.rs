//! Query a note database.
//!
//! A database is a `<id>.db.json` file holding column definitions. Its rows
//! are the notes whose frontmatter carries `db: <id>`; cells are the other
//! frontmatter fields.

use crate::args;
use crate::workspace;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct DatabaseSchema {
    pub columns: Vec<Column>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Column {
    pub name: String,
}

/// Load `<database_id>.db.json`.
pub(crate) async fn load_schema(
    ctx: &ToolContext,
    tool: &str,
    database_id: &str,
) -> Result<DatabaseSchema, ToolError> {
    let path = workspace::resolve(ctx, &format!("{database_id}.db.json"))?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ToolError::failed(tool, format!("cannot read database '{database_id}': {e}")))?;
    serde_json::from_str(&raw)
        .map_err(|e| ToolError::failed(tool, format!("invalid database '{database_id}': {e}")))
}

pub struct QueryDatabaseTool;

#[async_trait]
impl Tool for QueryDatabaseTool {
    fn name(&self) -> &str {
        "query_database"
    }

    fn description(&self) -> &str {
        "List the rows of a note database as a markdown table, optionally filtered by column values."
    }

    fn requires_approval(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "database_id": { "type": "string", "description": "Database id (file name without .db.json)" },
                "filter": { "type": "object", "description": "Column/value pairs that must all match" },
                "limit": { "type": "integer", "description": "Maximum rows (default 50)" }
            },
            "required": ["database_id"]
        })
    }

    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let database_id = args::required_text(params, &["database_id"])?;
        let limit = args::optional_u64(params, "limit").unwrap_or(50).max(1) as usize;
        let filter: Vec<(String, String)> = params
            .get("filter")
            .and_then(|f| f.as_object())
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.to_text())).collect())
            .unwrap_or_default();

        let schema = load_schema(ctx, self.name(), &database_id).await?;
        let columns: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();

        let mut rows = Vec::new();
        for note in workspace::markdown_files(&ctx.workspace_path, &ctx.workspace_path).await? {
            if rows.len() >= limit {
                break;
            }
            let Ok(content) = tokio::fs::read_to_string(&note.abs_path).await else {
                continue;
            };
            let Some(fields) = workspace::parse_frontmatter(&content) else {
                continue;
            };
            if fields.get("db").map(String::as_str) != Some(database_id.as_str()) {
                continue;
            }
            if !filter.iter().all(|(k, v)| fields.get(k) == Some(v)) {
                continue;
            }

            let title = fields.get("title").cloned().unwrap_or_else(|| "Untitled".into());
            let mut row = vec![title];
            row.extend(
                columns
                    .iter()
                    .map(|c| fields.get(*c).cloned().unwrap_or_else(|| "-".into())),
            );
            rows.push(row);
        }

        if rows.is_empty() {
            return Ok(ToolResult::completed(format!(
                "Database '{database_id}' has no matching rows."
            )));
        }

        let header = format!("| Title | {} |", columns.join(" | "));
        let separator = format!("|{}|", vec!["---"; columns.len() + 1].join("|"));
        let body: Vec<String> = rows.iter().map(|r| format!("| {} |", r.join(" | "))).collect();
        Ok(ToolResult::completed(format!("{header}\n{separator}\n{}", body.join("\n"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{params, workspace_with};

    const SCHEMA: &str = r#"{"columns":[{"name":"author"},{"name":"status"}]}"#;

    #[tokio::test]
    async fn renders_matching_rows_as_table() {
        let (_dir, ctx) = workspace_with(&[
            ("books.db.json", SCHEMA),
            ("dune.md", "---\ndb: books\ntitle: Dune\nauthor: Herbert\nstatus: read\n---\n"),
            ("emma.md", "---\ndb: books\ntitle: Emma\nauthor: Austen\n---\n"),
            ("other.md", "---\ndb: films\ntitle: Alien\n---\n"),
        ]);
        let result = QueryDatabaseTool
            .execute(&params(&[("database_id", "books")]), &ctx)
            .await
            .unwrap();
        let text = result.text();
        assert!(text.starts_with("| Title | author | status |\n|---|---|---|"));
        assert!(text.contains("| Dune | Herbert | read |"));
        assert!(text.contains("| Emma | Austen | - |"));
        assert!(!text.contains("Alien"));
    }

    #[tokio::test]
    async fn filter_must_match_every_pair() {
        let (_dir, ctx) = workspace_with(&[
            ("books.db.json", SCHEMA),
            ("dune.md", "---\ndb: books\ntitle: Dune\nstatus: read\n---\n"),
            ("emma.md", "---\ndb: books\ntitle: Emma\nstatus: unread\n---\n"),
        ]);
        let result = QueryDatabaseTool
            .execute(
                &params(&[("database_id", "books"), ("filter", r#"{"status": "unread"}"#)]),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.text().contains("Emma"));
        assert!(!result.text().contains("Dune"));
    }

    #[tokio::test]
    async fn missing_database_fails() {
        let (_dir, ctx) = workspace_with(&[]);
        let err = QueryDatabaseTool
            .execute(&params(&[("database_id", "nope")]), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot read database 'nope'"));
    }
}
