//! Tool trait, the abstraction over agent capabilities.
//!
//! Tools are what let the agent act on the note workspace: read, edit,
//! search, move notes, query databases, or ask the user a question.
//! The [`ToolRegistry`] is the single dispatch point; it never lets an
//! executor fault escape as anything but a failed [`ToolResult`].

use crate::error::ToolError;
use crate::value::Params;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

/// A tool invocation extracted from model text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Parameters, each classified once at parse time
    pub params: Params,

    /// The exact source span the call was parsed from
    pub raw: String,
}

/// The outcome of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    /// The tool ran; `content` is fed back to the model.
    Completed { content: String },
    /// The tool failed; `error` is fed back to the model.
    Failed { error: String },
    /// The loop must suspend until the host supplies an answer.
    AwaitingUserInput {
        question: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },
}

impl ToolResult {
    pub fn completed(content: impl Into<String>) -> Self {
        Self::Completed {
            content: content.into(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// The text rendered back to the model for this outcome.
    pub fn text(&self) -> &str {
        match self {
            Self::Completed { content } => content,
            Self::Failed { error } => error,
            Self::AwaitingUserInput { question, .. } => question,
        }
    }
}

/// Per-execution context handed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Root of the note workspace; every path parameter is relative to it
    pub workspace_path: PathBuf,

    /// Note currently open in the host, if any
    pub active_note_path: Option<String>,
}

impl ToolContext {
    pub fn new(workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            active_note_path: None,
        }
    }
}

/// A tool description rendered into the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,

    /// Whether the user must approve each call
    pub requires_approval: bool,
}

/// The core Tool trait.
///
/// Each note tool implements this trait and is registered in the
/// [`ToolRegistry`] under its name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool, also its XML tag (e.g., "read_note").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// Whether a call must be approved by the user before it runs.
    fn requires_approval(&self) -> bool;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: &Params, ctx: &ToolContext) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for the system prompt.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            requires_approval: self.requires_approval(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Render tool definitions into the system prompt
/// 2. Gate calls behind the approval policy
/// 3. Look up and execute tools when the model requests them
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, returning the executor it replaced, if any.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_string();
        self.tools.insert(name, tool)
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Whether calls to `name` need approval. Unknown names always do.
    pub fn requires_approval(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .is_none_or(|tool| tool.requires_approval())
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name.
    ///
    /// Never fails: unknown names, executor errors and executor panics all
    /// come back as [`ToolResult::Failed`].
    pub async fn execute(&self, name: &str, params: &Params, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = %name, "unknown tool requested");
            return ToolResult::failed(format!(
                "unknown tool: {name}. Available tools: {}",
                self.names().join(", ")
            ));
        };

        let outcome = AssertUnwindSafe(tool.execute(params, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::debug!(tool = %name, error = %e, "tool returned an error");
                ToolResult::failed(format!("tool execution failed: {e}"))
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "executor panicked".to_string());
                tracing::warn!(tool = %name, %message, "tool panicked");
                ToolResult::failed(format!("tool execution failed: {message}"))
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ParamValue;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn requires_approval(&self) -> bool {
            false
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, params: &Params, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            let text = params
                .get("text")
                .and_then(ParamValue::as_str)
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
            Ok(ToolResult::completed(text))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "explode"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        fn requires_approval(&self) -> bool {
            true
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(&self, _params: &Params, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            panic!("disk on fire")
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("/tmp")
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(PanickingTool));
        registry
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = registry();
        assert!(registry.has("echo"));
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo", "explode"]);
    }

    #[test]
    fn unknown_tools_require_approval() {
        let registry = registry();
        assert!(!registry.requires_approval("echo"));
        assert!(registry.requires_approval("explode"));
        assert!(registry.requires_approval("anything-unregistered"));
    }

    #[test]
    fn reregistering_replaces_executor() {
        let mut registry = ToolRegistry::new();
        let first: Arc<dyn Tool> = Arc::new(EchoTool);
        let second: Arc<dyn Tool> = Arc::new(EchoTool);
        assert!(registry.register(first.clone()).is_none());
        let replaced = registry.register(second.clone()).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(Arc::ptr_eq(&registry.get("echo").unwrap(), &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut params = Params::new();
        params.insert("text".into(), "hello world".into());
        let result = registry().execute("echo", &params, &ctx()).await;
        assert_eq!(result, ToolResult::completed("hello world"));
    }

    #[tokio::test]
    async fn unknown_tool_lists_available_names() {
        let result = registry().execute("nonexistent", &Params::new(), &ctx()).await;
        let ToolResult::Failed { error } = result else {
            panic!("expected failure");
        };
        assert!(error.starts_with("unknown tool: nonexistent"));
        assert!(error.contains("echo"));
        assert!(error.contains("explode"));
    }

    #[tokio::test]
    async fn executor_error_becomes_failed_result() {
        let result = registry().execute("echo", &Params::new(), &ctx()).await;
        let ToolResult::Failed { error } = result else {
            panic!("expected failure");
        };
        assert!(error.starts_with("tool execution failed:"));
        assert!(error.contains("missing 'text'"));
    }

    #[tokio::test]
    async fn executor_panic_is_contained() {
        let result = registry().execute("explode", &Params::new(), &ctx()).await;
        assert_eq!(result, ToolResult::failed("tool execution failed: disk on fire"));
    }

    #[test]
    fn awaiting_input_is_not_a_failure() {
        let result = ToolResult::AwaitingUserInput {
            question: "Which folder?".into(),
            options: vec!["inbox".into(), "archive".into()],
        };
        assert!(result.is_success());
        assert_eq!(result.text(), "Which folder?");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "awaiting_user_input");
    }
}
