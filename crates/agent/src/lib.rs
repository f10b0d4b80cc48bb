//! The Lumina agent.
//!
//! A task runs as a loop of model turns:
//!
//! 1. **Prompt**: role, workspace context and the tool protocol
//! 2. **Stream** the model reply, relaying chunks as events
//! 3. **Parse** tool calls out of the reply text
//! 4. **Execute** them in order, pausing for approval on write tools
//!    and for an answer on `ask_user`
//! 5. **Feed back** the rendered outcomes and loop
//!
//! The task ends when the model calls `attempt_completion`, when the step
//! ceiling is reached, or when the host aborts. In planned mode the model
//! first writes a plan and each step runs its own loop.

pub mod error;
pub mod loop_runner;
pub mod parser;
pub mod plan;
pub mod prompt;

pub use error::AgentError;
pub use loop_runner::{AgentLoop, TaskOutcome};
pub use parser::{OutcomeFormatter, ParsedResponse, ResponseParser};
pub use plan::parse_plan;
