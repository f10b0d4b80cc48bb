//! The agent task loop.
//!
//! One [`AgentLoop`] runs at most one task at a time. A task streams model
//! turns, parses tool calls out of each reply and executes them in order,
//! feeding the rendered outcomes back until the model calls
//! `attempt_completion`. Write tools and `ask_user` suspend the task in
//! `waiting_approval` until the host answers. Abort is honoured before
//! every model call, while a stream is being read, and while suspended.

use crate::error::AgentError;
use crate::parser::{OutcomeFormatter, ResponseParser};
use crate::plan::parse_plan;
use crate::prompt;
use futures::FutureExt;
use lumina_config::AppConfig;
use lumina_core::agent::{AgentConfig, AgentMode, AgentRole, AgentStatus, Plan, TaskContext};
use lumina_core::event::{AgentEvent, EventBus, PendingAction};
use lumina_core::message::{Conversation, Message};
use lumina_core::provider::{Provider, ProviderRequest, StreamChunk};
use lumina_core::tool::{ToolCall, ToolContext, ToolRegistry, ToolResult};
use lumina_rag::RagManager;
use lumina_tools::{ASK_USER_TOOL, COMPLETION_TOOL};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a task ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub status: AgentStatus,
    pub result: Option<String>,
    pub error: Option<String>,

    /// Model turns taken, planning included
    pub steps: u32,
}

/// A host decision delivered to a suspended task.
#[derive(Debug)]
enum Decision {
    Approve,
    Reject(Option<String>),
    Answer(String),
}

/// What a suspended task accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waiting {
    Approval,
    Answer,
}

struct ActiveTask {
    id: String,
    abort: watch::Sender<bool>,
    decisions: mpsc::UnboundedSender<Decision>,
    waiting: Option<(Waiting, PendingAction)>,
}

/// State shared between the host handle and the running task.
struct Shared {
    events: EventBus,
    status: watch::Sender<AgentStatus>,
    active: Mutex<Option<ActiveTask>>,
}

impl Shared {
    fn new(events: EventBus) -> Self {
        let (status, _) = watch::channel(AgentStatus::Idle);
        Self {
            events,
            status,
            active: Mutex::new(None),
        }
    }

    fn set_status(&self, status: AgentStatus, pending: Option<PendingAction>) {
        self.status.send_replace(status);
        self.events.publish(AgentEvent::StatusChange { status, pending });
    }
}

/// The agent loop. The host owns one per session.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    parser: Arc<ResponseParser>,
    formatter: OutcomeFormatter,
    config: AgentConfig,
    rag: Option<Arc<RagManager>>,
    shared: Arc<Shared>,
}

impl AgentLoop {
    /// Create a loop. The parser accepts exactly the tools in `tools`.
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            provider,
            parser: Arc::new(ResponseParser::from_registry(&tools)),
            tools,
            formatter: OutcomeFormatter::default(),
            config,
            rag: None,
            shared: Arc::new(Shared::new(EventBus::default())),
        }
    }

    /// Build the provider, the built-in tools and the loop from configuration.
    ///
    /// Fails before any network call when the provider is unknown or has no key.
    pub fn from_config(config: &AppConfig, rag: Option<Arc<RagManager>>) -> Result<Self, AgentError> {
        let provider = lumina_providers::create_provider(&config.provider)
            .map_err(|e| AgentError::Config(e.to_string()))?;
        let tools = Arc::new(lumina_tools::default_registry(rag.clone()));

        let mut agent = Self::new(provider, tools, config.to_agent_config())
            .with_formatter(OutcomeFormatter::from_config(&config.parser));
        if let Some(rag) = rag {
            agent = agent.with_rag(rag);
        }
        Ok(agent)
    }

    pub fn with_formatter(mut self, formatter: OutcomeFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Attach retrieval used to prefetch context for each task.
    pub fn with_rag(mut self, rag: Arc<RagManager>) -> Self {
        self.rag = Some(rag);
        self
    }

    /// Publish events on `events` instead of a private bus.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.shared = Arc::new(Shared::new(events));
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn status(&self) -> AgentStatus {
        *self.shared.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<AgentStatus> {
        self.shared.status.subscribe()
    }

    /// What a suspended task is waiting on, or `None` while it is not
    /// suspended. Lets a host that missed the status event catch up.
    pub async fn pending_action(&self) -> Option<PendingAction> {
        let active = self.shared.active.lock().await;
        active
            .as_ref()
            .and_then(|task| task.waiting.as_ref())
            .map(|(_, pending)| pending.clone())
    }

    /// Events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.shared.events.subscribe()
    }

    /// Start a task in the background.
    ///
    /// Fails with [`AgentError::TaskActive`] while another task is running
    /// or suspended. The handle resolves once the task reached a terminal
    /// status.
    pub async fn start_task(
        &self,
        task: impl Into<String>,
        ctx: TaskContext,
    ) -> Result<JoinHandle<TaskOutcome>, AgentError> {
        let task = task.into();
        let mut active = self.shared.active.lock().await;
        let current = self.status();
        if active.is_some() || current.is_active() {
            return Err(AgentError::TaskActive(current));
        }

        let id = Uuid::new_v4().to_string();
        let (abort_tx, abort_rx) = watch::channel(false);
        let (decision_tx, decision_rx) = mpsc::unbounded_channel();
        *active = Some(ActiveTask {
            id: id.clone(),
            abort: abort_tx,
            decisions: decision_tx,
            waiting: None,
        });
        self.shared.set_status(AgentStatus::Running, None);
        drop(active);

        info!(task_id = %id, mode = ?self.config.mode, "task started");
        let run = TaskRun {
            id,
            provider: self.provider.clone(),
            tools: self.tools.clone(),
            parser: self.parser.clone(),
            formatter: self.formatter.clone(),
            config: self.config.clone(),
            rag: self.rag.clone(),
            shared: self.shared.clone(),
            tool_ctx: ToolContext {
                workspace_path: ctx.workspace_path.clone(),
                active_note_path: ctx.active_note_path.clone(),
            },
            ctx,
            abort: abort_rx,
            decisions: decision_rx,
            turns: 0,
        };
        Ok(tokio::spawn(run.execute(task)))
    }

    /// Ask the active task to stop. Returns `false` when no task is active.
    pub async fn abort_task(&self) -> bool {
        let active = self.shared.active.lock().await;
        match active.as_ref() {
            Some(task) => {
                info!(task_id = %task.id, "abort requested");
                task.abort.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Run the write tool the task is waiting on.
    pub async fn approve(&self) -> Result<(), AgentError> {
        self.decide(&[Waiting::Approval], Decision::Approve, "approval")
            .await
    }

    /// Refuse the pending write tool, or decline to answer a question.
    pub async fn reject(&self, reason: Option<String>) -> Result<(), AgentError> {
        self.decide(
            &[Waiting::Approval, Waiting::Answer],
            Decision::Reject(reason),
            "a decision",
        )
        .await
    }

    /// Answer the pending `ask_user` question and resume.
    pub async fn continue_with_answer(&self, answer: impl Into<String>) -> Result<(), AgentError> {
        self.decide(&[Waiting::Answer], Decision::Answer(answer.into()), "an answer")
            .await
    }

    async fn decide(
        &self,
        accepts: &[Waiting],
        decision: Decision,
        what: &'static str,
    ) -> Result<(), AgentError> {
        let mut active = self.shared.active.lock().await;
        let Some(task) = active.as_mut() else {
            return Err(AgentError::NotWaiting(what));
        };
        match &task.waiting {
            Some((waiting, _)) if accepts.contains(waiting) => {
                task.waiting = None;
                task.decisions
                    .send(decision)
                    .map_err(|_| AgentError::NotWaiting(what))
            }
            _ => Err(AgentError::NotWaiting(what)),
        }
    }
}

impl std::fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools)
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

/// Why a task stopped without a result.
enum Stop {
    Aborted,
    Failed(String),
}

/// Resolves once an abort was requested.
async fn aborted(abort: &mut watch::Receiver<bool>) {
    // A closed channel cannot be un-aborted either.
    let _ = abort.wait_for(|aborted| *aborted).await;
}

/// One task, owned by its spawned future.
struct TaskRun {
    id: String,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    parser: Arc<ResponseParser>,
    formatter: OutcomeFormatter,
    config: AgentConfig,
    rag: Option<Arc<RagManager>>,
    shared: Arc<Shared>,
    ctx: TaskContext,
    tool_ctx: ToolContext,
    abort: watch::Receiver<bool>,
    decisions: mpsc::UnboundedReceiver<Decision>,
    turns: u32,
}

impl TaskRun {
    async fn execute(mut self, task: String) -> TaskOutcome {
        let result = match AssertUnwindSafe(self.drive(&task)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(Stop::Failed("internal error: task panicked".into())),
        };

        // Release the slot and publish the terminal status under one lock, so
        // a host that sees the terminal status can start the next task.
        let mut active = self.shared.active.lock().await;
        active.take();
        let outcome = match result {
            Ok(text) => {
                self.shared.events.publish(AgentEvent::Complete {
                    result: text.clone(),
                });
                self.shared.set_status(AgentStatus::Completed, None);
                self.outcome(AgentStatus::Completed, Some(text), None)
            }
            Err(Stop::Aborted) => {
                self.shared.set_status(AgentStatus::Aborted, None);
                self.outcome(AgentStatus::Aborted, None, None)
            }
            Err(Stop::Failed(message)) => {
                self.shared.events.publish(AgentEvent::Error {
                    message: message.clone(),
                });
                self.shared.set_status(AgentStatus::Error, None);
                self.outcome(AgentStatus::Error, None, Some(message))
            }
        };
        drop(active);

        info!(task_id = %self.id, status = %outcome.status, steps = outcome.steps, "task finished");
        outcome
    }

    fn outcome(&self, status: AgentStatus, result: Option<String>, error: Option<String>) -> TaskOutcome {
        TaskOutcome {
            status,
            result,
            error,
            steps: self.turns,
        }
    }

    async fn drive(&mut self, task: &str) -> Result<String, Stop> {
        self.prefetch_context(task).await;

        if self.config.mode == AgentMode::Planned {
            if let Some(plan) = self.make_plan(task).await? {
                return self.run_plan(task, plan).await;
            }
            info!(task_id = %self.id, "no usable plan; running the task directly");
        }
        self.tool_loop(AgentRole::Editor, task).await
    }

    /// Fill `rag_results` from retrieval when the host supplied none.
    async fn prefetch_context(&mut self, task: &str) {
        let Some(rag) = &self.rag else {
            return;
        };
        if !self.ctx.rag_results.is_empty() || !rag.is_initialized().await {
            return;
        }
        match rag.search(task, &rag.default_options()).await {
            Ok(results) => {
                debug!(task_id = %self.id, results = results.len(), "retrieval context prefetched");
                self.ctx.rag_results = results;
            }
            Err(e) => warn!(task_id = %self.id, error = %e, "retrieval prefetch failed"),
        }
    }

    fn check_abort(&self) -> Result<(), Stop> {
        if *self.abort.borrow() {
            Err(Stop::Aborted)
        } else {
            Ok(())
        }
    }

    fn request(&self, messages: &[Message], stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream,
            stop: Vec::new(),
        }
    }

    /// Run tool turns until the completion tool succeeds.
    async fn tool_loop(&mut self, role: AgentRole, task: &str) -> Result<String, Stop> {
        let definitions = self.tools.definitions();
        let mut conversation = Conversation::for_task(
            prompt::system_prompt(role, &self.ctx, &definitions, &self.config.locale),
            task,
        );

        for step in 1..=self.config.max_steps {
            debug!(task_id = %self.id, step, role = role.as_str(), "model turn");
            let reply = self.stream_turn(&conversation.messages).await?;
            let parsed = self.parser.parse(&reply);
            conversation.push(Message::assistant(reply));

            if parsed.tool_calls.is_empty() {
                debug!(task_id = %self.id, step, "reply without tool call");
                conversation.push(Message::user(prompt::NO_TOOL_NUDGE));
                continue;
            }

            let mut feedback = Vec::with_capacity(parsed.tool_calls.len());
            for call in &parsed.tool_calls {
                self.check_abort()?;
                self.shared.events.publish(AgentEvent::ToolCall { call: call.clone() });

                let result = self.run_call(call).await?;
                self.shared.events.publish(AgentEvent::ToolResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    result: result.clone(),
                });

                if call.name == COMPLETION_TOOL
                    && let ToolResult::Completed { content } = &result
                {
                    return Ok(content.clone());
                }
                feedback.push(self.formatter.format(call, &result));
            }
            conversation.push(Message::user(feedback.join("\n\n")));
        }

        warn!(task_id = %self.id, max_steps = self.config.max_steps, "step ceiling reached");
        Err(Stop::Failed(format!(
            "maximum steps ({}) exceeded",
            self.config.max_steps
        )))
    }

    async fn run_call(&mut self, call: &ToolCall) -> Result<ToolResult, Stop> {
        if call.name == ASK_USER_TOOL {
            let result = self.execute_tool(call).await?;
            let ToolResult::AwaitingUserInput { question, options } = result else {
                return Ok(result);
            };
            let pending = PendingAction::Question {
                call_id: call.id.clone(),
                question,
                options,
            };
            return Ok(match self.suspend(Waiting::Answer, pending).await? {
                Decision::Answer(answer) => ToolResult::completed(format!("User answered: {answer}")),
                Decision::Reject(_) | Decision::Approve => {
                    ToolResult::failed("The user declined to answer")
                }
            });
        }

        if !self.config.auto_approve && self.tools.requires_approval(&call.name) {
            let pending = PendingAction::Approval { call: call.clone() };
            match self.suspend(Waiting::Approval, pending).await? {
                Decision::Approve => {}
                Decision::Reject(reason) => {
                    info!(task_id = %self.id, tool = %call.name, "tool call rejected");
                    return Ok(ToolResult::failed(match reason {
                        Some(reason) => format!("User rejected the operation: {reason}"),
                        None => "User rejected the operation".to_string(),
                    }));
                }
                Decision::Answer(_) => {
                    return Ok(ToolResult::failed("The operation was not approved"));
                }
            }
        }

        self.execute_tool(call).await
    }

    /// Run a tool, dropping it if the task is aborted meanwhile.
    async fn execute_tool(&mut self, call: &ToolCall) -> Result<ToolResult, Stop> {
        debug!(task_id = %self.id, tool = %call.name, "executing tool");
        let tools = self.tools.clone();
        tokio::select! {
            biased;
            _ = aborted(&mut self.abort) => Err(Stop::Aborted),
            result = tools.execute(&call.name, &call.params, &self.tool_ctx) => Ok(result),
        }
    }

    /// Park in `waiting_approval` until the host decides or aborts.
    async fn suspend(&mut self, waiting: Waiting, pending: PendingAction) -> Result<Decision, Stop> {
        self.check_abort()?;
        {
            let mut active = self.shared.active.lock().await;
            if let Some(task) = active.as_mut() {
                task.waiting = Some((waiting, pending.clone()));
            }
            self.shared
                .set_status(AgentStatus::WaitingApproval, Some(pending));
        }
        info!(task_id = %self.id, ?waiting, "waiting for the user");

        let decision = tokio::select! {
            biased;
            _ = aborted(&mut self.abort) => None,
            decision = self.decisions.recv() => decision,
        };
        let Some(decision) = decision else {
            return Err(Stop::Aborted);
        };

        self.shared.set_status(AgentStatus::Running, None);
        Ok(decision)
    }

    /// One streamed model turn. Returns the visible text.
    async fn stream_turn(&mut self, messages: &[Message]) -> Result<String, Stop> {
        self.check_abort()?;
        self.turns += 1;
        let request = self.request(messages, true);

        let mut stream = tokio::select! {
            biased;
            _ = aborted(&mut self.abort) => return Err(Stop::Aborted),
            result = self.provider.stream(request) => {
                result.map_err(|e| Stop::Failed(format!("model request failed: {e}")))?
            }
        };

        let mut text = String::new();
        loop {
            let item = tokio::select! {
                biased;
                // Partial output of an aborted turn is dropped.
                _ = aborted(&mut self.abort) => return Err(Stop::Aborted),
                item = stream.next() => item,
            };
            match item {
                None => break,
                Some(Err(e)) => return Err(Stop::Failed(format!("model stream failed: {e}"))),
                Some(Ok(StreamChunk::Text { text: delta })) => {
                    if delta.is_empty() {
                        continue;
                    }
                    text.push_str(&delta);
                    self.shared.events.publish(AgentEvent::MessageChunk {
                        content: delta,
                        reasoning: false,
                    });
                }
                Some(Ok(StreamChunk::Reasoning { text: delta })) => {
                    self.shared.events.publish(AgentEvent::MessageChunk {
                        content: delta,
                        reasoning: true,
                    });
                }
                Some(Ok(StreamChunk::Usage { usage })) => {
                    self.shared.events.publish(AgentEvent::usage(usage));
                }
            }
        }
        Ok(text)
    }

    /// One non-streamed model turn, used for planning.
    async fn complete_turn(&mut self, messages: &[Message]) -> Result<String, Stop> {
        self.check_abort()?;
        self.turns += 1;
        let request = self.request(messages, false);

        let response = tokio::select! {
            biased;
            _ = aborted(&mut self.abort) => return Err(Stop::Aborted),
            result = self.provider.complete(request) => {
                result.map_err(|e| Stop::Failed(format!("model request failed: {e}")))?
            }
        };
        if let Some(usage) = response.usage {
            self.shared.events.publish(AgentEvent::usage(usage));
        }
        Ok(response.message.content)
    }

    async fn make_plan(&mut self, task: &str) -> Result<Option<Plan>, Stop> {
        let system = prompt::planning_prompt(&self.ctx, &self.config.locale);
        for attempt in 1..=self.config.max_plan_iterations {
            let messages = [Message::system(system.clone()), Message::user(task)];
            let reply = self.complete_turn(&messages).await?;
            if let Some(plan) = parse_plan(&reply) {
                info!(task_id = %self.id, steps = plan.steps.len(), "plan created");
                return Ok(Some(plan));
            }
            debug!(task_id = %self.id, attempt, "planner reply held no usable plan");
        }
        Ok(None)
    }

    async fn run_plan(&mut self, task: &str, mut plan: Plan) -> Result<String, Stop> {
        self.shared
            .events
            .publish(AgentEvent::PlanCreated { plan: plan.clone() });

        let mut finished = Vec::with_capacity(plan.steps.len());
        for index in 0..plan.steps.len() {
            plan.current_step = index;
            let step = plan.steps[index].clone();
            self.shared.events.publish(AgentEvent::StepStarted {
                index,
                step: step.clone(),
            });

            let message = prompt::step_task(task, &step, &finished);
            let result = self.tool_loop(step.assigned_role, &message).await?;

            let done = &mut plan.steps[index];
            done.completed = true;
            done.result = Some(result.clone());
            self.shared.events.publish(AgentEvent::StepCompleted {
                index,
                step: done.clone(),
            });
            finished.push(format!("{}. {}: {result}", step.id, step.description));
        }

        Ok(finished.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumina_core::error::ProviderError;
    use lumina_core::provider::{ProviderResponse, Usage};
    use lumina_core::stream::{ChunkSender, ChunkStream};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    const DONE: &str = "<attempt_completion><result>done</result></attempt_completion>";
    const CREATE: &str = "<create_note><path>new.md</path><content># New</content></create_note>";

    /// Replies with canned responses in order and records every request.
    struct ScriptedProvider {
        replies: StdMutex<Vec<String>>,
        requests: StdMutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(replies.iter().map(|r| r.to_string()).collect()),
                requests: StdMutex::new(Vec::new()),
            })
        }

        fn request(&self, index: usize) -> ProviderRequest {
            self.requests.lock().unwrap()[index].clone()
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_user_message(&self, index: usize) -> String {
            self.request(index).messages.last().unwrap().content.clone()
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "script exhausted".into(),
                });
            }
            Ok(ProviderResponse {
                message: Message::assistant(replies.remove(0)),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: "scripted".into(),
            })
        }
    }

    /// Sends one chunk, then never finishes.
    struct StalledProvider {
        sender: StdMutex<Option<ChunkSender>>,
    }

    #[async_trait::async_trait]
    impl Provider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("not used".into()))
        }

        async fn stream(&self, _request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
            let (tx, stream) = lumina_core::stream::channel(8);
            tx.send(StreamChunk::Text {
                text: "partial".into(),
            })
            .await;
            *self.sender.lock().unwrap() = Some(tx);
            Ok(stream)
        }
    }

    fn agent_with(provider: Arc<dyn Provider>, configure: impl FnOnce(&mut AgentConfig)) -> AgentLoop {
        let mut config = AgentConfig::new("scripted-model");
        configure(&mut config);
        AgentLoop::new(provider, Arc::new(lumina_tools::default_registry(None)), config)
    }

    fn workspace(files: &[(&str, &str)]) -> (TempDir, TaskContext) {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            std::fs::write(dir.path().join(path), content).unwrap();
        }
        let ctx = TaskContext::new(dir.path());
        (dir, ctx)
    }

    fn drain(rx: &mut broadcast::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn wait_for_status(agent: &AgentLoop, status: AgentStatus) {
        let mut rx = agent.watch_status();
        rx.wait_for(|s| *s == status).await.unwrap();
    }

    #[tokio::test]
    async fn completes_after_tool_round_trip() {
        let (_dir, ctx) = workspace(&[("a.md", "alpha\nbeta")]);
        let provider = ScriptedProvider::new(&[
            "Reading first.\n<read_note><path>a.md</path></read_note>",
            "<attempt_completion><result>Read a.md</result></attempt_completion>",
        ]);
        let agent = agent_with(provider.clone(), |_| {});
        let mut events = agent.subscribe();

        let outcome = agent.start_task("Read a.md", ctx).await.unwrap().await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Completed);
        assert_eq!(outcome.result.as_deref(), Some("Read a.md"));
        assert_eq!(outcome.steps, 2);
        assert_eq!(agent.status(), AgentStatus::Completed);

        let first = provider.request(0);
        assert!(first.stream);
        assert!(first.messages[0].content.contains("## read_note"));
        assert_eq!(first.messages[1].content, "Read a.md");

        let feedback = provider.last_user_message(1);
        assert!(feedback.starts_with("<tool_result name=\"read_note\""));
        assert!(feedback.contains("   1 | alpha"));

        let events = drain(&mut events);
        assert_eq!(events.first(), Some(&AgentEvent::status(AgentStatus::Running)));
        assert_eq!(events.last(), Some(&AgentEvent::status(AgentStatus::Completed)));
        assert_eq!(
            events[events.len() - 2],
            AgentEvent::Complete {
                result: "Read a.md".into()
            }
        );
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::MessageChunk { content, reasoning: false } if content.contains("Reading first.")
        )));
        assert!(events.iter().any(|e| matches!(e, AgentEvent::TokenUsage { total_tokens: 15, .. })));
        let tool_events: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ToolCall { call } => Some(format!("call:{}", call.name)),
                AgentEvent::ToolResult { name, .. } => Some(format!("result:{name}")),
                _ => None,
            })
            .collect();
        assert_eq!(
            tool_events,
            vec![
                "call:read_note",
                "result:read_note",
                "call:attempt_completion",
                "result:attempt_completion"
            ]
        );
    }

    #[tokio::test]
    async fn nudges_when_reply_has_no_tool() {
        let (_dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&["Sure, I can help with that.", DONE]);
        let agent = agent_with(provider.clone(), |_| {});

        let outcome = agent.start_task("Tidy up", ctx).await.unwrap().await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Completed);
        assert_eq!(provider.last_user_message(1), prompt::NO_TOOL_NUDGE);
    }

    #[tokio::test]
    async fn step_ceiling_ends_in_error() {
        let (_dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&["hmm", "still thinking", DONE]);
        let agent = agent_with(provider.clone(), |c| c.max_steps = 2);
        let mut events = agent.subscribe();

        let outcome = agent.start_task("Loop", ctx).await.unwrap().await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Error);
        assert_eq!(outcome.error.as_deref(), Some("maximum steps (2) exceeded"));
        assert_eq!(provider.calls(), 2);

        let events = drain(&mut events);
        assert!(events.contains(&AgentEvent::Error {
            message: "maximum steps (2) exceeded".into()
        }));
        assert_eq!(events.last(), Some(&AgentEvent::status(AgentStatus::Error)));
    }

    #[tokio::test]
    async fn provider_failure_ends_in_error() {
        let (_dir, ctx) = workspace(&[]);
        let agent = agent_with(ScriptedProvider::new(&[]), |_| {});
        let outcome = agent.start_task("Anything", ctx).await.unwrap().await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Error);
        assert!(outcome.error.unwrap().contains("script exhausted"));
    }

    #[tokio::test]
    async fn write_tools_wait_for_approval() {
        let (dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&[CREATE, DONE]);
        let agent = agent_with(provider.clone(), |_| {});
        let mut events = agent.subscribe();

        let handle = agent.start_task("Create a note", ctx).await.unwrap();
        wait_for_status(&agent, AgentStatus::WaitingApproval).await;
        assert!(!dir.path().join("new.md").exists());
        assert!(matches!(
            agent.continue_with_answer("yes").await,
            Err(AgentError::NotWaiting(_))
        ));

        agent.approve().await.unwrap();
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Completed);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("new.md")).unwrap(),
            "# New"
        );

        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::StatusChange {
                status: AgentStatus::WaitingApproval,
                pending: Some(PendingAction::Approval { call }),
            } if call.name == "create_note"
        )));
    }

    #[tokio::test]
    async fn lagged_subscriber_recovers_the_pending_approval() {
        let (dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&[CREATE, DONE]);
        let agent = agent_with(provider, |_| {}).with_event_bus(EventBus::new(1));
        let mut events = agent.subscribe();
        assert!(agent.pending_action().await.is_none());

        let handle = agent.start_task("Create a note", ctx).await.unwrap();
        wait_for_status(&agent, AgentStatus::WaitingApproval).await;
        assert!(matches!(
            events.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));

        match agent.pending_action().await {
            Some(PendingAction::Approval { call }) => assert_eq!(call.name, "create_note"),
            other => panic!("unexpected pending action: {other:?}"),
        }

        agent.approve().await.unwrap();
        assert!(agent.pending_action().await.is_none());
        assert_eq!(handle.await.unwrap().status, AgentStatus::Completed);
        assert!(dir.path().join("new.md").exists());
        assert!(agent.pending_action().await.is_none());
    }

    #[tokio::test]
    async fn rejection_is_reported_to_the_model() {
        let (dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&[CREATE, DONE]);
        let agent = agent_with(provider.clone(), |_| {});

        let handle = agent.start_task("Create a note", ctx).await.unwrap();
        wait_for_status(&agent, AgentStatus::WaitingApproval).await;
        agent.reject(Some("not now".into())).await.unwrap();

        assert_eq!(handle.await.unwrap().status, AgentStatus::Completed);
        assert!(!dir.path().join("new.md").exists());
        let feedback = provider.last_user_message(1);
        assert!(feedback.starts_with("<tool_error name=\"create_note\""));
        assert!(feedback.contains("User rejected the operation: not now"));
    }

    #[tokio::test]
    async fn auto_approve_skips_the_wait() {
        let (dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&[CREATE, DONE]);
        let agent = agent_with(provider, |c| c.auto_approve = true);
        let mut events = agent.subscribe();

        let outcome = agent.start_task("Create a note", ctx).await.unwrap().await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Completed);
        assert!(dir.path().join("new.md").exists());
        assert!(!drain(&mut events).iter().any(|e| matches!(
            e,
            AgentEvent::StatusChange {
                status: AgentStatus::WaitingApproval,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn ask_user_suspends_even_with_auto_approve() {
        let (_dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&[
            r#"<ask_user><question>Which folder?</question><options>["inbox", "archive"]</options></ask_user>"#,
            DONE,
        ]);
        let agent = agent_with(provider.clone(), |c| c.auto_approve = true);
        let mut events = agent.subscribe();

        let handle = agent.start_task("File my note", ctx).await.unwrap();
        wait_for_status(&agent, AgentStatus::WaitingApproval).await;
        assert!(matches!(agent.approve().await, Err(AgentError::NotWaiting(_))));
        agent.continue_with_answer("inbox").await.unwrap();

        assert_eq!(handle.await.unwrap().status, AgentStatus::Completed);
        assert!(provider.last_user_message(1).contains("User answered: inbox"));

        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::StatusChange {
                pending: Some(PendingAction::Question { question, options, .. }),
                ..
            } if question == "Which folder?" && options == &vec!["inbox".to_string(), "archive".to_string()]
        )));
    }

    #[tokio::test]
    async fn abort_while_waiting_stops_everything() {
        let (dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&[CREATE, DONE]);
        let agent = agent_with(provider.clone(), |_| {});
        let mut events = agent.subscribe();

        let handle = agent.start_task("Create a note", ctx).await.unwrap();
        wait_for_status(&agent, AgentStatus::WaitingApproval).await;
        drain(&mut events);

        assert!(agent.abort_task().await);
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Aborted);
        assert_eq!(outcome.result, None);
        assert_eq!(provider.calls(), 1);
        assert!(!dir.path().join("new.md").exists());

        assert_eq!(drain(&mut events), vec![AgentEvent::status(AgentStatus::Aborted)]);
        assert!(!agent.abort_task().await);
    }

    #[tokio::test]
    async fn abort_mid_stream_discards_partial_output() {
        let (_dir, ctx) = workspace(&[]);
        let provider = Arc::new(StalledProvider {
            sender: StdMutex::new(None),
        });
        let agent = agent_with(provider, |_| {});
        let mut events = agent.subscribe();

        let handle = agent.start_task("Write something", ctx).await.unwrap();
        loop {
            if let AgentEvent::MessageChunk { .. } = events.recv().await.unwrap() {
                break;
            }
        }

        agent.abort_task().await;
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Aborted);
        assert_eq!(outcome.result, None);
        assert_eq!(drain(&mut events), vec![AgentEvent::status(AgentStatus::Aborted)]);
    }

    /// Signals when it starts, then never returns.
    struct HangingTool {
        started: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl lumina_core::tool::Tool for HangingTool {
        fn name(&self) -> &str {
            "slow_scan"
        }
        fn description(&self) -> &str {
            "Never finishes"
        }
        fn requires_approval(&self) -> bool {
            false
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(
            &self,
            _params: &lumina_core::Params,
            _ctx: &ToolContext,
        ) -> Result<ToolResult, lumina_core::error::ToolError> {
            self.started.notify_one();
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn abort_interrupts_a_running_tool() {
        let (_dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&["<slow_scan></slow_scan>", DONE]);
        let tool = Arc::new(HangingTool {
            started: tokio::sync::Notify::new(),
        });
        let mut registry = lumina_tools::default_registry(None);
        registry.register(tool.clone());
        let agent = AgentLoop::new(provider.clone(), Arc::new(registry), AgentConfig::new("scripted-model"));
        let mut events = agent.subscribe();

        let handle = agent.start_task("Scan everything", ctx).await.unwrap();
        tool.started.notified().await;
        drain(&mut events);

        assert!(agent.abort_task().await);
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("abort should not wait for the tool")
            .unwrap();
        assert_eq!(outcome.status, AgentStatus::Aborted);
        assert_eq!(provider.calls(), 1);
        assert_eq!(drain(&mut events), vec![AgentEvent::status(AgentStatus::Aborted)]);
    }

    #[tokio::test]
    async fn one_task_at_a_time() {
        let (_dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&[CREATE, DONE]);
        let agent = agent_with(provider, |_| {});

        let handle = agent.start_task("First", ctx.clone()).await.unwrap();
        wait_for_status(&agent, AgentStatus::WaitingApproval).await;
        assert!(matches!(
            agent.start_task("Second", ctx.clone()).await,
            Err(AgentError::TaskActive(AgentStatus::WaitingApproval))
        ));

        agent.abort_task().await;
        assert_eq!(handle.await.unwrap().status, AgentStatus::Aborted);

        let outcome = agent.start_task("Third", ctx).await.unwrap().await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Completed);
    }

    #[tokio::test]
    async fn host_calls_without_a_task() {
        let agent = agent_with(ScriptedProvider::new(&[]), |_| {});
        assert_eq!(agent.status(), AgentStatus::Idle);
        assert!(matches!(agent.approve().await, Err(AgentError::NotWaiting(_))));
        assert!(matches!(agent.reject(None).await, Err(AgentError::NotWaiting(_))));
        assert!(matches!(
            agent.continue_with_answer("x").await,
            Err(AgentError::NotWaiting(_))
        ));
        assert!(!agent.abort_task().await);
    }

    #[tokio::test]
    async fn failed_tools_are_fed_back() {
        let (_dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&["<read_note><path>missing.md</path></read_note>", DONE]);
        let agent = agent_with(provider.clone(), |_| {});
        let mut events = agent.subscribe();

        let outcome = agent.start_task("Read", ctx).await.unwrap().await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Completed);
        assert!(provider.last_user_message(1).starts_with("<tool_error name=\"read_note\""));
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            AgentEvent::ToolResult { name, result, .. } if name == "read_note" && !result.is_success()
        )));
    }

    #[tokio::test]
    async fn planned_mode_runs_each_step() {
        let (_dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&[
            r#"{"steps":[{"id":"1","description":"Find notes","agent":"researcher"},{"id":"2","description":"Write summary","agent":"writer"}]}"#,
            "<attempt_completion><result>found 3</result></attempt_completion>",
            "<attempt_completion><result>written</result></attempt_completion>",
        ]);
        let agent = agent_with(provider.clone(), |c| c.mode = AgentMode::Planned);
        let mut events = agent.subscribe();

        let outcome = agent.start_task("Summarise", ctx).await.unwrap().await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Completed);
        assert_eq!(
            outcome.result.as_deref(),
            Some("1. Find notes: found 3\n2. Write summary: written")
        );
        assert_eq!(outcome.steps, 3);

        let planning = provider.request(0);
        assert!(!planning.stream);
        assert!(planning.messages[0].content.contains("Reply with JSON only"));
        assert!(provider.request(1).messages[0].content.starts_with("You are Lumina's researcher."));
        assert!(provider.request(2).messages[1].content.contains("1. Find notes: found 3"));

        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(e, AgentEvent::PlanCreated { plan } if plan.steps.len() == 2)));
        let completed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::StepCompleted { index, step } => Some((*index, step.completed, step.result.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            completed,
            vec![
                (0, true, Some("found 3".to_string())),
                (1, true, Some("written".to_string()))
            ]
        );
    }

    #[tokio::test]
    async fn unusable_plan_falls_back_to_direct_mode() {
        let (_dir, ctx) = workspace(&[]);
        let provider = ScriptedProvider::new(&["no idea", "still no plan", DONE]);
        let agent = agent_with(provider.clone(), |c| {
            c.mode = AgentMode::Planned;
            c.max_plan_iterations = 2;
        });
        let mut events = agent.subscribe();

        let outcome = agent.start_task("Summarise", ctx).await.unwrap().await.unwrap();
        assert_eq!(outcome.status, AgentStatus::Completed);
        assert_eq!(provider.calls(), 3);
        assert!(!drain(&mut events).iter().any(|e| matches!(e, AgentEvent::PlanCreated { .. })));
    }

    #[tokio::test]
    async fn retrieval_context_is_prefetched() {
        use lumina_config::RagConfig;
        use lumina_rag::{DisabledReranker, HashEmbedder, InMemoryVectorStore};

        let (dir, ctx) = workspace(&[]);
        let rag = Arc::new(RagManager::new(
            RagConfig::default(),
            Arc::new(HashEmbedder::new(64)),
            Arc::new(DisabledReranker),
        ));
        rag.initialize_with_store(dir.path(), Arc::new(InMemoryVectorStore::new()))
            .await;
        rag.index_file("rust.md", "# Rust\nownership and borrowing", 1)
            .await
            .unwrap();

        let provider = ScriptedProvider::new(&[DONE]);
        let agent = agent_with(provider.clone(), |_| {}).with_rag(rag);
        agent
            .start_task("ownership borrowing", ctx)
            .await
            .unwrap()
            .await
            .unwrap();

        assert!(provider.request(0).messages[0].content.contains("Related notes:\nrust.md:"));
    }
}
