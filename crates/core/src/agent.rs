//! Agent configuration, status, plan and task-context types.

use crate::retrieval::SearchResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of one agent loop. The single source of truth for
/// whether a task is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    WaitingApproval,
    Completed,
    Error,
    Aborted,
}

impl AgentStatus {
    /// A task is running or suspended waiting for the host.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::WaitingApproval)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Aborted)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::WaitingApproval => "waiting_approval",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// The persona a prompt is built for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Coordinator,
    Planner,
    Executor,
    #[default]
    Editor,
    Researcher,
    Writer,
    Organizer,
    Reporter,
}

impl AgentRole {
    /// Parse a role name as written by the planner; unknown names map to `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let role = match name.trim().to_ascii_lowercase().as_str() {
            "coordinator" => Self::Coordinator,
            "planner" => Self::Planner,
            "executor" => Self::Executor,
            "editor" => Self::Editor,
            "researcher" => Self::Researcher,
            "writer" => Self::Writer,
            "organizer" | "organiser" => Self::Organizer,
            "reporter" => Self::Reporter,
            _ => return None,
        };
        Some(role)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Planner => "planner",
            Self::Executor => "executor",
            Self::Editor => "editor",
            Self::Researcher => "researcher",
            Self::Writer => "writer",
            Self::Organizer => "organizer",
            Self::Reporter => "reporter",
        }
    }
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub assigned_role: AgentRole,

    /// Set only after the step's completion result arrived successfully
    #[serde(default)]
    pub completed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// An ordered list of steps and a cursor into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub current_step: usize,
}

impl Plan {
    pub fn is_finished(&self) -> bool {
        self.steps.iter().all(|s| s.completed)
    }
}

/// Workspace context supplied by the host when a task starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    pub workspace_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_note_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_note_content: Option<String>,

    /// Pre-rendered workspace tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_tree: Option<String>,

    /// Retrieval hits relevant to the task
    #[serde(default)]
    pub rag_results: Vec<SearchResult>,

    /// Paths of notes linked from the active note
    #[serde(default)]
    pub resolved_links: Vec<String>,
}

impl TaskContext {
    pub fn new(workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            ..Default::default()
        }
    }
}

/// How a task is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// One tool loop until `attempt_completion`
    #[default]
    Direct,
    /// Ask for a plan first, then one tool loop per step
    Planned,
}

/// Configuration for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model to request from the provider
    pub model: String,

    #[serde(default = "default_temp")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Model turns allowed per tool loop before the task fails
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Attempts at producing a valid plan before falling back to direct mode
    #[serde(default = "default_max_plan_iterations")]
    pub max_plan_iterations: u32,

    /// Run write tools without asking
    #[serde(default)]
    pub auto_approve: bool,

    #[serde(default)]
    pub mode: AgentMode,

    /// Language the model should answer in
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_temp() -> f32 {
    0.7
}
fn default_max_steps() -> u32 {
    10
}
fn default_max_plan_iterations() -> u32 {
    3
}
fn default_locale() -> String {
    "en".into()
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: default_temp(),
            max_tokens: None,
            max_steps: default_max_steps(),
            max_plan_iterations: default_max_plan_iterations(),
            auto_approve: false,
            mode: AgentMode::default(),
            locale: default_locale(),
        }
    }
}
