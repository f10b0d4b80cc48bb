//! Plan extraction from a planner reply.

use lumina_core::agent::{AgentRole, Plan, PlanStep};
use serde_json::Value;

/// Parse `{"steps": [{"id", "description", "agent"}]}` out of a reply.
///
/// The JSON object may be surrounded by prose or a code fence. Steps
/// without a description are dropped; unknown or non-worker agents become
/// `editor`. Returns `None` when no step survives.
pub fn parse_plan(reply: &str) -> Option<Plan> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    let json: Value = serde_json::from_str(&reply[start..=end]).ok()?;

    let steps: Vec<PlanStep> = json
        .get("steps")?
        .as_array()?
        .iter()
        .enumerate()
        .filter_map(|(i, step)| {
            let description = step.get("description")?.as_str()?.trim();
            if description.is_empty() {
                return None;
            }
            let id = match step.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => (i + 1).to_string(),
            };
            let assigned_role = step
                .get("agent")
                .and_then(Value::as_str)
                .and_then(AgentRole::parse)
                .filter(|role| is_worker(*role))
                .unwrap_or(AgentRole::Editor);
            Some(PlanStep {
                id,
                description: description.to_string(),
                assigned_role,
                completed: false,
                result: None,
            })
        })
        .collect();

    if steps.is_empty() {
        return None;
    }
    Some(Plan {
        steps,
        current_step: 0,
    })
}

fn is_worker(role: AgentRole) -> bool {
    matches!(
        role,
        AgentRole::Editor | AgentRole::Researcher | AgentRole::Writer | AgentRole::Organizer
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_plan() {
        let reply = r#"Here is the plan:
```json
{"steps": [
  {"id": "1", "description": "Find notes about tokio", "agent": "researcher"},
  {"id": 2, "description": "Write a summary note", "agent": "Writer"}
]}
```"#;
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].assigned_role, AgentRole::Researcher);
        assert_eq!(plan.steps[1].id, "2");
        assert_eq!(plan.steps[1].assigned_role, AgentRole::Writer);
        assert!(!plan.is_finished());
    }

    #[test]
    fn unknown_agents_fall_back_to_editor() {
        let plan = parse_plan(
            r#"{"steps":[{"description":"Fix typos","agent":"wizard"},{"description":"Report","agent":"reporter"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.steps[0].id, "1");
        assert!(plan.steps.iter().all(|s| s.assigned_role == AgentRole::Editor));
    }

    #[test]
    fn rejects_unusable_replies() {
        assert!(parse_plan("I cannot plan this").is_none());
        assert!(parse_plan("} backwards {").is_none());
        assert!(parse_plan(r#"{"steps": []}"#).is_none());
        assert!(parse_plan(r#"{"steps": [{"id": "1"}]}"#).is_none());
        assert!(parse_plan(r#"{"plan": "none"}"#).is_none());
    }
}
