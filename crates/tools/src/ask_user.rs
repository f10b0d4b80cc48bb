//! Pause the task and ask the user a question.

use crate::args;
use async_trait::async_trait;
use lumina_core::error::ToolError;
use lumina_core::tool::{Tool, ToolContext, ToolResult};
use lumina_core::value::Params;

pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the user a question and wait for the answer. Use when the task is ambiguous."
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "description": "The question to ask" },
                "options": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Suggested answers"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, params: &Params, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let question = args::required_text(params, &["question"])?;
        let options = args::text_list(params, "options").unwrap_or_default();
        Ok(ToolResult::AwaitingUserInput { question, options })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{params, workspace_with};

    #[tokio::test]
    async fn returns_awaiting_input() {
        let (_dir, ctx) = workspace_with(&[]);
        let result = AskUserTool
            .execute(
                &params(&[("question", "Which folder?"), ("options", r#"["inbox", "archive"]"#)]),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(
            result,
            ToolResult::AwaitingUserInput {
                question: "Which folder?".into(),
                options: vec!["inbox".into(), "archive".into()],
            }
        );
    }
}
