//! Agent events, the only channel from the loop to the host.
//!
//! Events are published in emission order on a broadcast bus. Status
//! changes bracket the events they describe: `running` precedes any chunk
//! or tool event of a turn, and a terminal status is the last event of a
//! task.

use crate::agent::{AgentStatus, Plan, PlanStep};
use crate::provider::Usage;
use crate::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What the loop is waiting on while in `waiting_approval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingAction {
    /// A write tool needs an approve/reject decision.
    Approval { call: ToolCall },
    /// `ask_user` needs an answer.
    Question {
        call_id: String,
        question: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },
}

/// All events a task can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StatusChange {
        status: AgentStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pending: Option<PendingAction>,
    },

    /// Streamed model output. `reasoning` chunks are never parsed for tools.
    MessageChunk {
        content: String,
        #[serde(default)]
        reasoning: bool,
    },

    ToolCall { call: ToolCall },

    ToolResult {
        call_id: String,
        name: String,
        result: ToolResult,
    },

    PlanCreated { plan: Plan },

    StepStarted { index: usize, step: PlanStep },

    StepCompleted { index: usize, step: PlanStep },

    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    },

    Complete { result: String },

    Error { message: String },
}

impl AgentEvent {
    pub fn status(status: AgentStatus) -> Self {
        Self::StatusChange {
            status,
            pending: None,
        }
    }

    pub fn usage(usage: Usage) -> Self {
        Self::TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }

    /// The wire tag of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StatusChange { .. } => "status_change",
            Self::MessageChunk { .. } => "message_chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::PlanCreated { .. } => "plan_created",
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::TokenUsage { .. } => "token_usage",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

/// A broadcast-based event bus for agent events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Each loop
/// instance owns its own bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AgentEvent) {
        tracing::trace!(event = event.event_type(), "agent event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(AgentEvent::status(AgentStatus::Running));
        bus.publish(AgentEvent::MessageChunk {
            content: "Reading".into(),
            reasoning: false,
        });

        assert_eq!(rx.recv().await.unwrap(), AgentEvent::status(AgentStatus::Running));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "message_chunk");
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(AgentEvent::Error {
            message: "no subscribers".into(),
        });
    }

    #[test]
    fn events_are_tagged_snake_case() {
        let event = AgentEvent::StatusChange {
            status: AgentStatus::WaitingApproval,
            pending: Some(PendingAction::Question {
                call_id: "c1".into(),
                question: "Which note?".into(),
                options: vec![],
            }),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_change");
        assert_eq!(json["status"], "waiting_approval");
        assert_eq!(json["pending"]["kind"], "question");
    }
}
