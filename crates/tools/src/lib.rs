//! Built-in note tools for Lumina.
//!
//! Tools let the agent work on a note workspace: read, create, edit, move
//! and delete notes, search them by text, regex or meaning, query note
//! databases, follow backlinks, ask the user, and finish the task.
//!
//! Every path is workspace-relative and sandboxed by [`workspace::resolve`].

pub mod add_database_row;
pub mod args;
pub mod ask_user;
pub mod attempt_completion;
pub mod create_note;
pub mod delete_note;
pub mod edit_note;
pub mod get_backlinks;
pub mod grep_search;
pub mod list_notes;
pub mod move_note;
pub mod query_database;
pub mod read_note;
pub mod search_notes;
pub mod semantic_search;
pub mod workspace;

use lumina_core::tool::ToolRegistry;
use lumina_rag::RagManager;
use std::sync::Arc;

pub use attempt_completion::COMPLETION_TOOL;

/// Name of the tool that pauses the loop for a user answer.
pub const ASK_USER_TOOL: &str = "ask_user";

/// Create a registry with all built-in tools.
///
/// `semantic_search` reports an uninitialized index when `rag` is `None`.
pub fn default_registry(rag: Option<Arc<RagManager>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(read_note::ReadNoteTool));
    registry.register(Arc::new(edit_note::EditNoteTool));
    registry.register(Arc::new(create_note::CreateNoteTool));
    registry.register(Arc::new(list_notes::ListNotesTool));
    registry.register(Arc::new(move_note::MoveNoteTool));
    registry.register(Arc::new(delete_note::DeleteNoteTool));
    registry.register(Arc::new(search_notes::SearchNotesTool));
    registry.register(Arc::new(grep_search::GrepSearchTool));
    registry.register(Arc::new(semantic_search::SemanticSearchTool::new(rag)));
    registry.register(Arc::new(query_database::QueryDatabaseTool));
    registry.register(Arc::new(add_database_row::AddDatabaseRowTool));
    registry.register(Arc::new(get_backlinks::GetBacklinksTool));
    registry.register(Arc::new(ask_user::AskUserTool));
    registry.register(Arc::new(attempt_completion::AttemptCompletionTool));
    registry
}

#[cfg(test)]
pub(crate) mod testing {
    use lumina_core::tool::ToolContext;
    use lumina_core::value::{ParamValue, Params};

    /// Parameters classified the way the response parser would.
    pub fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ParamValue::classify(v)))
            .collect()
    }

    /// A temporary workspace populated with `files`.
    pub fn workspace_with(files: &[(&str, &str)]) -> (tempfile::TempDir, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        let ctx = ToolContext::new(dir.path());
        (dir, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{params, workspace_with};
    use lumina_core::tool::ToolResult;

    #[test]
    fn registry_has_all_tools() {
        let registry = default_registry(None);
        assert_eq!(registry.len(), 14);
        assert!(registry.has(COMPLETION_TOOL));
        assert!(registry.has(ASK_USER_TOOL));
    }

    #[test]
    fn approval_policy() {
        let registry = default_registry(None);
        for read_only in [
            "read_note",
            "list_notes",
            "search_notes",
            "grep_search",
            "semantic_search",
            "query_database",
            "get_backlinks",
            "attempt_completion",
        ] {
            assert!(!registry.requires_approval(read_only), "{read_only}");
        }
        for gated in [
            "edit_note",
            "create_note",
            "move_note",
            "delete_note",
            "add_database_row",
            "ask_user",
        ] {
            assert!(registry.requires_approval(gated), "{gated}");
        }
    }

    #[tokio::test]
    async fn registry_normalizes_tool_errors() {
        let (_dir, ctx) = workspace_with(&[]);
        let registry = default_registry(None);
        let result = registry
            .execute("read_note", &params(&[("path", "../outside.md")]), &ctx)
            .await;
        let ToolResult::Failed { error } = result else {
            panic!("expected failure");
        };
        assert!(error.starts_with("tool execution failed:"));
        assert!(error.contains("outside the workspace"));
    }
}
