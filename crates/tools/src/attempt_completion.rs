//! Finish the task with a result summary.

use crate::args;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;

/// Name of the terminal completion tool.
pub const COMPLETION_TOOL: &str = "attempt_completion";

pub struct AttemptCompletionTool;

#[async_trait]
impl Tool for AttemptCompletionTool {
    fn name(&self) -> &str {
        COMPLETION_TOOL
    }

    fn description(&self) -> &str {
        "Finish the task. The result is shown to the user as the final answer."
    }

    fn requires_approval(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "result": { "type": "string", "description": "Summary of what was done" }
            },
            "required": ["result"]
        })
    }

    async fn execute(&self, params: &Params, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let result = args::required_text(params, &["result"])?;
        Ok(ToolResult::completed(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{params, workspace_with};

    #[tokio::test]
    async fn echoes_result() {
        let (_dir, ctx) = workspace_with(&[]);
        let result = AttemptCompletionTool
            .execute(&params(&[("result", "Summarised 3 notes")]), &ctx)
            .await
            .unwrap();
        assert_eq!(result, ToolResult::completed("Summarised 3 notes"));
    }
}
