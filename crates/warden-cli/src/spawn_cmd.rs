//! `warden spawn` command: create and run a single subtask outside of
//! any plan, standing in for a standalone agent session delegating work
//! (spec §4.3, §4.8 "standalone sessions").
//!
//! Goes through the same [`warden_core::tools::ToolSurface`] an
//! in-process agent runtime would call `spawn_subtask` through, rather
//! than reaching past it into `SubTaskManager` directly, so this command
//! exercises C6/C7 end to end (including the [`crate::notify::CliNotifier`]
//! reference implementation) and not just C3.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use warden_core::collaborators::{AgentRunner, NoopAgentRunner, ShellAgentRunner};
use warden_core::discovery::AgentDiscovery;
use warden_core::identity::WorkerContext;
use warden_core::monitor::UpdateBus;
use warden_core::permission::{PermissionPolicy, PermissionRouter};
use warden_core::safety::{SafetyLimits, SafetyLimitsConfig};
use warden_core::subtask::SubTaskManager;
use warden_core::tools::ToolSurface;

use crate::config::WardenCliConfig;
use crate::notify::CliNotifier;

pub struct SpawnArgs {
    pub agent_type: String,
    pub prompt: String,
    pub expected_output: String,
    pub worktree: PathBuf,
    pub base_branch: Option<String>,
    pub agent_command: Option<String>,
    pub dry_run: bool,
}

pub async fn run(args: SpawnArgs) -> Result<()> {
    let context = WorkerContext::standalone(
        &format!("warden-spawn-{}", uuid::Uuid::new_v4()),
        Some(args.worktree.clone()),
        None,
    )
    .context("could not establish a worker context for this session")?;

    let safety = Arc::new(SafetyLimits::new(SafetyLimitsConfig::default()));
    let bus = Arc::new(UpdateBus::new());

    bus.register_standalone_parent_handler(
        context.worker_id,
        Some(|line: String| println!("{line}")),
    );

    let agent_runner: Arc<dyn AgentRunner> = match (&args.agent_command, args.dry_run) {
        (_, true) => Arc::new(NoopAgentRunner::completing_with("dry run, no agent invoked")),
        (Some(cmd), false) => Arc::new(ShellAgentRunner::new(cmd.clone())),
        (None, false) => Arc::new(NoopAgentRunner::completing_with(
            "no --agent-command given; simulated completion",
        )),
    };

    let subtasks = Arc::new(SubTaskManager::new(
        Arc::clone(&safety),
        Arc::clone(&bus),
        agent_runner,
    ));
    let cli_config = WardenCliConfig::resolve(None).await;
    let permission = Arc::new(PermissionRouter::with_config(
        PermissionPolicy::default(),
        cli_config.policy,
    ));
    let discovery = Arc::new(Mutex::new(AgentDiscovery::new()));

    let tools = ToolSurface::new(
        // `spawn_subtask` never touches the plan manager; a fresh one
        // with no worktree backing is enough to satisfy the constructor.
        Arc::new(warden_core::plan::PlanManager::new(None)),
        Arc::clone(&subtasks),
        Arc::clone(&bus),
        permission,
        discovery,
        Arc::new(CliNotifier),
        uuid::Uuid::new_v4(),
    );

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        eprintln!("\ncancelling subtask...");
        cancel_for_signal.cancel();
    });

    let spawned = tools
        .spawn_subtask(
            &context,
            args.agent_type,
            args.prompt,
            args.expected_output,
            None,
            true,
            cancel,
        )
        .await?;

    println!("Spawned subtask {}", spawned.task_id);

    let status = tools
        .get_worker_status(spawned.task_id)
        .context("subtask vanished after blocking spawn_subtask returned")?;

    match status.status.as_str() {
        "completed" => {
            println!("completed: {}", status.result.unwrap_or_default());
        }
        "failed" => {
            println!("failed: {}", status.result.unwrap_or_default());
            std::process::exit(1);
        }
        "cancelled" => {
            println!("cancelled");
            std::process::exit(130);
        }
        other => unreachable!("blocking spawn_subtask left a non-terminal status {other:?}"),
    }

    // Drain anything the subtask pushed to its own event log (useful if
    // the agent runner reported progress/idle before finishing).
    for update in tools.worker_event_log(spawned.task_id) {
        println!("  {}", warden_core::monitor::format_for_push(&update));
    }

    Ok(())
}
