//! `lumina run`: drive one agent task from the terminal.

use anyhow::Context;
use lumina_agent::{AgentError, AgentLoop};
use lumina_core::agent::{AgentMode, AgentStatus, TaskContext};
use lumina_core::event::{AgentEvent, PendingAction};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;

pub struct RunArgs {
    pub task: String,
    pub workspace: Option<PathBuf>,
    pub note: Option<String>,
    pub plan: bool,
    pub auto_approve: bool,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = super::load_config(args.workspace)?;
    if args.plan {
        config.agent.mode = AgentMode::Planned;
    }
    if args.auto_approve {
        config.agent.auto_approve = true;
    }
    let workspace = config.workspace_dir();

    let rag = if config.rag.enabled {
        match super::open_rag(&config, &workspace).await {
            Ok(rag) => Some(rag),
            Err(e) => {
                tracing::warn!("retrieval unavailable, continuing without it: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let agent = AgentLoop::from_config(&config, rag)?;

    let mut ctx = TaskContext::new(&workspace);
    if let Some(note) = args.note {
        match tokio::fs::read_to_string(workspace.join(&note)).await {
            Ok(content) => ctx.active_note_content = Some(content),
            Err(e) => tracing::warn!(note = %note, "could not read active note: {e}"),
        }
        ctx.active_note_path = Some(note);
    }

    // Subscribe first so the initial status change is not missed.
    let mut events = agent.subscribe();
    let handle = agent.start_task(args.task, ctx).await?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nAborting...");
                agent.abort_task().await;
                continue;
            }
        };

        let event = match event {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event stream lagged");
                // The skipped events may include the suspension itself
                let status = agent.status();
                if status.is_terminal() {
                    break;
                }
                if status == AgentStatus::WaitingApproval {
                    prompt_if_waiting(&agent, &mut stdin).await?;
                }
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            AgentEvent::StatusChange { status, .. } if status == AgentStatus::WaitingApproval => {
                prompt_if_waiting(&agent, &mut stdin).await?;
            }
            AgentEvent::StatusChange { status, .. } if status.is_terminal() => break,
            event => render(&event),
        }
    }

    let outcome = handle.await.context("agent task panicked")?;
    println!();
    match outcome.status {
        AgentStatus::Completed => {
            eprintln!("[done in {} turns]", outcome.steps);
            Ok(())
        }
        AgentStatus::Aborted => {
            eprintln!("[aborted]");
            Ok(())
        }
        _ => anyhow::bail!(
            "task failed: {}",
            outcome.error.unwrap_or_else(|| "unknown error".into())
        ),
    }
}

fn render(event: &AgentEvent) {
    match event {
        AgentEvent::MessageChunk { content, reasoning } => {
            if *reasoning {
                eprint!("{content}");
            } else {
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
        }
        AgentEvent::ToolCall { call } => {
            eprintln!("\n-> {} {}", call.name, params_json(&call.params));
        }
        AgentEvent::ToolResult { name, result, .. } => match result {
            lumina_core::ToolResult::Completed { .. } => eprintln!("<- {name}: ok"),
            lumina_core::ToolResult::Failed { error } => eprintln!("<- {name}: {error}"),
            lumina_core::ToolResult::AwaitingUserInput { .. } => {}
        },
        AgentEvent::PlanCreated { plan } => {
            eprintln!("Plan:");
            for step in &plan.steps {
                eprintln!("  {}. [{}] {}", step.id, step.assigned_role.as_str(), step.description);
            }
        }
        AgentEvent::StepStarted { step, .. } => {
            eprintln!("\n== Step {}: {}", step.id, step.description);
        }
        AgentEvent::StepCompleted { step, .. } => {
            eprintln!("== Step {} done", step.id);
        }
        AgentEvent::TokenUsage { total_tokens, .. } => {
            tracing::debug!(total_tokens, "token usage");
        }
        AgentEvent::Complete { result } => {
            println!("\n\n{result}");
        }
        AgentEvent::Error { message } => {
            eprintln!("\nError: {message}");
        }
        AgentEvent::StatusChange { status, .. } => {
            tracing::debug!(%status, "status");
        }
    }
}

/// Prompt for the action the task is suspended on, if it still is.
///
/// The loop is the source of truth, so a stale or replayed status event
/// never prompts twice for the same suspension.
async fn prompt_if_waiting(
    agent: &AgentLoop,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<()> {
    let Some(pending) = agent.pending_action().await else {
        return Ok(());
    };
    if let Err(e) = handle_pending(agent, pending, stdin).await {
        match e.downcast_ref::<AgentError>() {
            // The task was aborted or moved on while we were prompting
            Some(AgentError::NotWaiting(_)) => tracing::debug!("decision no longer needed: {e}"),
            _ => return Err(e),
        }
    }
    Ok(())
}

async fn handle_pending(
    agent: &AgentLoop,
    pending: PendingAction,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<()> {
    match pending {
        PendingAction::Approval { call } => {
            eprintln!("\n{} wants to run with {}", call.name, params_json(&call.params));
            eprint!("Approve {}? [y/N] ", call.name);
            let line = read_line(agent, stdin).await?;
            match line {
                Some(line) if is_yes(&line) => agent.approve().await?,
                Some(_) => agent.reject(None).await?,
                None => {}
            }
        }
        PendingAction::Question {
            question, options, ..
        } => {
            eprintln!("\n{question}");
            for (i, option) in options.iter().enumerate() {
                eprintln!("  {}. {option}", i + 1);
            }
            eprint!("Answer (empty to decline): ");
            if let Some(line) = read_line(agent, stdin).await? {
                match answer_for(&line, &options) {
                    Some(answer) => agent.continue_with_answer(answer).await?,
                    None => agent.reject(None).await?,
                }
            }
        }
    }
    Ok(())
}

/// Read one line, aborting the task on Ctrl-C or end of input.
async fn read_line(
    agent: &AgentLoop,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<Option<String>> {
    tokio::select! {
        line = stdin.next_line() => {
            let line = line.context("failed to read from stdin")?;
            if line.is_none() {
                agent.abort_task().await;
            }
            Ok(line)
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nAborting...");
            agent.abort_task().await;
            Ok(None)
        }
    }
}

fn is_yes(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// A number picks an option; other text is the answer itself.
fn answer_for(line: &str, options: &[String]) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Ok(n) = line.parse::<usize>()
        && (1..=options.len()).contains(&n)
    {
        return Some(options[n - 1].clone());
    }
    Some(line.to_string())
}

fn params_json(params: &lumina_core::Params) -> String {
    serde_json::to_string(params).unwrap_or_default()
}
