//! System prompts for each agent role.

use lumina_core::agent::{AgentRole, PlanStep, TaskContext};
use lumina_core::tool::ToolDefinition;
use std::fmt::Write;

/// Sent back when a reply contains no tool call.
pub const NO_TOOL_NUDGE: &str = "You did not use a tool. Continue the task with a tool call, \
     and finish with <attempt_completion><result>...</result></attempt_completion> when done.";

/// Characters of the active note included in the prompt.
const ACTIVE_NOTE_PREVIEW: usize = 4000;

fn role_description(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Coordinator => "You are Lumina's coordinator. Work out what the user wants and route the task.",
        AgentRole::Planner => "You are Lumina's planner. Break complex tasks into small executable steps.",
        AgentRole::Executor => "You are Lumina's executor. Carry out the current plan step precisely.",
        AgentRole::Editor => "You are Lumina, a note assistant specialised in precise edits to markdown notes.",
        AgentRole::Researcher => "You are Lumina's researcher. Search the notes in depth and report what you find.",
        AgentRole::Writer => "You are Lumina's writer. Create well-structured, high-quality notes.",
        AgentRole::Organizer => "You are Lumina's organizer. Keep folders tidy and move, rename or delete notes.",
        AgentRole::Reporter => "You are Lumina's reporter. Summarise what was done in clear markdown.",
    }
}

/// Tools a role should prefer. Every registered tool stays callable.
pub fn recommended_tools(role: AgentRole) -> &'static [&'static str] {
    match role {
        AgentRole::Editor => &[
            "read_note",
            "edit_note",
            "search_notes",
            "grep_search",
            "semantic_search",
            "attempt_completion",
        ],
        AgentRole::Researcher => &[
            "read_note",
            "list_notes",
            "search_notes",
            "grep_search",
            "semantic_search",
            "get_backlinks",
            "query_database",
            "attempt_completion",
        ],
        AgentRole::Writer => &[
            "read_note",
            "create_note",
            "edit_note",
            "list_notes",
            "search_notes",
            "add_database_row",
            "attempt_completion",
        ],
        AgentRole::Organizer => &[
            "list_notes",
            "move_note",
            "delete_note",
            "create_note",
            "read_note",
            "attempt_completion",
        ],
        AgentRole::Reporter => &["attempt_completion"],
        AgentRole::Coordinator | AgentRole::Planner | AgentRole::Executor => &[
            "read_note",
            "edit_note",
            "create_note",
            "list_notes",
            "search_notes",
            "ask_user",
            "attempt_completion",
        ],
    }
}

/// Build the system prompt for a tool loop.
pub fn system_prompt(
    role: AgentRole,
    ctx: &TaskContext,
    tools: &[ToolDefinition],
    locale: &str,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{}\n", role_description(role));
    let _ = writeln!(prompt, "Workspace: {}", ctx.workspace_path.display());
    let _ = writeln!(prompt, "Answer in the language of this locale: {locale}\n");

    prompt.push_str("====\n\nCONTEXT\n\n");
    prompt.push_str(&context_section(ctx));

    prompt.push_str("\n====\n\nTOOL USE\n\n");
    prompt.push_str(
        "Call a tool by writing its name as an XML tag with one child tag per parameter:\n\n\
         <tool_name>\n<param1>value1</param1>\n<param2>value2</param2>\n</tool_name>\n\n\
         Arrays, numbers and booleans are written as JSON, e.g. <paths>[\"a.md\", \"b.md\"]</paths>.\n\n\
         Example, read a note:\n<read_note>\n<path>daily/2024-01-15.md</path>\n</read_note>\n\n\
         Example, edit a note:\n<edit_note>\n<path>daily/2024-01-15.md</path>\n\
         <old_string>old text</old_string>\n<new_string>new text</new_string>\n</edit_note>\n\n\
         Results come back inside <tool_result> or <tool_error> tags.\n\n",
    );

    prompt.push_str("# Available tools\n\n");
    for tool in tools {
        let approval = if tool.requires_approval {
            " (requires user approval)"
        } else {
            ""
        };
        let _ = writeln!(prompt, "## {}{approval}\n{}", tool.name, tool.description);
        let _ = writeln!(prompt, "Parameters: {}\n", tool.parameters);
    }
    let _ = writeln!(
        prompt,
        "Recommended for your role: {}\n",
        recommended_tools(role).join(", ")
    );

    prompt.push_str(
        "====\n\nRULES\n\n\
         1. All paths are relative to the workspace root.\n\
         2. Read a note with read_note before editing it; old_string must match exactly.\n\
         3. Use create_note only for notes that do not exist yet.\n\
         4. Act on the context instead of asking for information you can look up.\n\
         5. You may call several tools in a row; wait for their results before relying on them.\n\
         6. If a tool fails, try another approach instead of giving up.\n\
         7. When the task is done, call attempt_completion with a short summary.\n",
    );
    prompt
}

fn context_section(ctx: &TaskContext) -> String {
    let mut parts = Vec::new();

    if let Some(path) = &ctx.active_note_path {
        let mut part = format!("Active note: {path}");
        if let Some(content) = &ctx.active_note_content {
            let preview: String = content.chars().take(ACTIVE_NOTE_PREVIEW).collect();
            let _ = write!(part, "\n```markdown\n{preview}\n```");
        }
        parts.push(part);
    }

    if !ctx.resolved_links.is_empty() {
        parts.push(format!("Linked notes: {}", ctx.resolved_links.join(", ")));
    }

    if !ctx.rag_results.is_empty() {
        let hits: Vec<String> = ctx
            .rag_results
            .iter()
            .map(|r| {
                format!(
                    "{}:{}-{} (score {:.2})\n{}",
                    r.file_path, r.start_line, r.end_line, r.score, r.content
                )
            })
            .collect();
        parts.push(format!("Related notes:\n{}", hits.join("\n---\n")));
    }

    if let Some(tree) = &ctx.file_tree {
        parts.push(format!("Workspace files:\n{tree}"));
    }

    if parts.is_empty() {
        "(no context)\n".to_string()
    } else {
        format!("{}\n", parts.join("\n\n"))
    }
}

/// Prompt asking for a JSON plan.
pub fn planning_prompt(ctx: &TaskContext, locale: &str) -> String {
    format!(
        "{}\n\n\
         Workspace: {}\n\
         Write step descriptions in the language of this locale: {locale}\n\n\
         Each step is handled by one worker: editor, researcher, writer or organizer.\n\
         Reply with JSON only:\n\
         {{\"steps\": [{{\"id\": \"1\", \"description\": \"what to do\", \"agent\": \"researcher\"}}]}}\n\n\
         CONTEXT\n\n{}",
        role_description(AgentRole::Planner),
        ctx.workspace_path.display(),
        context_section(ctx)
    )
}

/// The user message for one plan step.
pub fn step_task(task: &str, step: &PlanStep, previous: &[String]) -> String {
    let mut message = format!("Overall task: {task}\n\nCurrent step {}: {}", step.id, step.description);
    if !previous.is_empty() {
        let _ = write!(message, "\n\nCompleted steps:\n{}", previous.join("\n"));
    }
    message.push_str("\n\nOnly do this step, then call attempt_completion with its result.");
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumina_core::retrieval::SearchResult;

    fn definition(name: &str, requires_approval: bool) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: format!("{name} description"),
            parameters: serde_json::json!({"type": "object"}),
            requires_approval,
        }
    }

    #[test]
    fn prompt_lists_tools_and_context() {
        let mut ctx = TaskContext::new("/notes");
        ctx.active_note_path = Some("daily/today.md".into());
        ctx.active_note_content = Some("# Today".into());
        ctx.rag_results = vec![SearchResult {
            file_path: "rust.md".into(),
            content: "ownership rules".into(),
            score: 0.82,
            heading: None,
            start_line: 3,
            end_line: 9,
        }];

        let prompt = system_prompt(
            AgentRole::Researcher,
            &ctx,
            &[definition("read_note", false), definition("delete_note", true)],
            "de",
        );
        assert!(prompt.starts_with("You are Lumina's researcher."));
        assert!(prompt.contains("Workspace: /notes"));
        assert!(prompt.contains("locale: de"));
        assert!(prompt.contains("Active note: daily/today.md\n```markdown\n# Today"));
        assert!(prompt.contains("rust.md:3-9 (score 0.82)\nownership rules"));
        assert!(prompt.contains("## read_note\nread_note description"));
        assert!(prompt.contains("## delete_note (requires user approval)"));
        assert!(prompt.contains("Recommended for your role: read_note, list_notes"));
    }

    #[test]
    fn empty_context_is_marked() {
        let prompt = system_prompt(AgentRole::Editor, &TaskContext::new("/w"), &[], "en");
        assert!(prompt.contains("CONTEXT\n\n(no context)"));
    }

    #[test]
    fn every_role_recommends_completion() {
        for role in [
            AgentRole::Coordinator,
            AgentRole::Planner,
            AgentRole::Executor,
            AgentRole::Editor,
            AgentRole::Researcher,
            AgentRole::Writer,
            AgentRole::Organizer,
            AgentRole::Reporter,
        ] {
            assert!(recommended_tools(role).contains(&"attempt_completion"), "{role:?}");
        }
    }

    #[test]
    fn step_task_mentions_previous_results() {
        let step = PlanStep {
            id: "2".into(),
            description: "Write the summary".into(),
            assigned_role: AgentRole::Writer,
            completed: false,
            result: None,
        };
        let text = step_task("Summarise rust notes", &step, &["1. Found 3 notes".into()]);
        assert!(text.contains("Current step 2: Write the summary"));
        assert!(text.contains("Completed steps:\n1. Found 3 notes"));
    }
}
