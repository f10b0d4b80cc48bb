//! Errors returned to the host by the agent loop.

use lumina_core::agent::AgentStatus;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Another task is running or suspended on this loop.
    #[error("a task is already active (status: {0})")]
    TaskActive(AgentStatus),

    /// The host answered a suspension that is not pending.
    #[error("no task is waiting for {0}")]
    NotWaiting(&'static str),

    #[error("agent configuration error: {0}")]
    Config(String),
}
