//! `warden plan validate` / `warden plan run`: build an in-memory plan
//! graph (C4) from a `plan.toml` file and either print it back or
//! dispatch it with the orchestrator (C5) to completion, in the style of
//! the teacher's `gator plan create` + `gator dispatch` pair collapsed
//! into one in-process command (spec §1 Non-goals: no cross-invocation
//! plan durability, so there is no separate "create" step to persist).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use warden_core::collaborators::{AgentRunner, NoopAgentRunner, ShellAgentRunner};
use warden_core::monitor::UpdateBus;
use warden_core::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorResult};
use warden_core::plan::PlanManager;
use warden_core::safety::{EmergencyScope, SafetyLimits, SafetyLimitsConfig};
use warden_core::subtask::SubTaskManager;

use crate::plan_file;

pub fn validate(path: &Path) -> Result<()> {
    let file = plan_file::load(path)?;
    let resolved = plan_file::resolve_tasks(&file)?;

    println!("plan: {}", file.plan.name);
    if !file.plan.description.is_empty() {
        println!("  {}", file.plan.description);
    }
    if let Some(base) = &file.plan.base_branch {
        println!("  base branch: {base}");
    }
    if let Some(budget) = file.plan.budget {
        println!("  budget: ${budget:.2}");
    }
    println!("  {} task(s):", resolved.len());
    for (name, opts) in &resolved {
        let deps = if opts.dependencies.is_empty() {
            "none".to_string()
        } else {
            format!("{} dep(s)", opts.dependencies.len())
        };
        println!("    - {name} [{:?}] depends_on: {deps}", opts.priority);
    }

    Ok(())
}

pub struct RunArgs<'a> {
    pub path: &'a Path,
    pub max_agents: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub agent_command: Option<String>,
}

pub async fn run(args: RunArgs<'_>) -> Result<()> {
    let file = plan_file::load(args.path)?;
    let resolved = plan_file::resolve_tasks(&file)?;

    let agent_runner: Arc<dyn AgentRunner> = match &args.agent_command {
        Some(cmd) => Arc::new(ShellAgentRunner::new(cmd.clone())),
        None => Arc::new(NoopAgentRunner::completing_with("simulated completion (no --agent-command given)")),
    };

    let safety = Arc::new(SafetyLimits::new(SafetyLimitsConfig::default()));
    let monitor = Arc::new(UpdateBus::new());
    let plans = Arc::new(PlanManager::new(None));
    let subtasks = Arc::new(SubTaskManager::new(
        Arc::clone(&safety),
        Arc::clone(&monitor),
        Arc::clone(&agent_runner),
    ));
    let orchestrator = Orchestrator::new(plans.clone(), subtasks, monitor, Arc::clone(&safety), agent_runner);

    let plan = plans.create_plan(file.plan.name.clone(), file.plan.description.clone(), file.plan.base_branch.clone());
    println!("Created plan {} ({})", plan.name, plan.id);

    for (name, opts) in resolved {
        let task = plans.add_task(plan.id, name.clone(), opts)?;
        println!("  + task {name} ({})", task.id);
    }

    orchestrator.on_did_change_workers(|worker| {
        println!("  -> deployed worker {} for task {}", worker.worker_id, worker.task_id);
    });

    let config = OrchestratorConfig {
        max_agents: args.max_agents,
        task_timeout: Duration::from_secs(args.timeout_secs),
        max_retries: args.max_retries,
        token_budget: file.plan.budget,
    };

    // Graceful shutdown, same double-signal shape as the teacher's
    // `gator dispatch`: first Ctrl+C requests cooperative cancellation;
    // second invokes a real C1 emergency-stop across the whole plan and
    // force-exits (SPEC_FULL.md "Graceful shutdown / Ctrl+C handling").
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);
    let safety_for_signal = Arc::clone(&safety);
    let plan_id_for_signal = plan.id;

    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                let stop = safety_for_signal.emergency_stop(
                    EmergencyScope::Plan { plan_id: plan_id_for_signal },
                    "second interrupt from operator",
                    chrono::Utc::now(),
                );
                eprintln!(
                    "\nEmergency stop: killed {} subtask(s). Force exit.",
                    stop.sub_tasks_killed
                );
                std::process::exit(130);
            }
            eprintln!("\nShutting down gracefully (Ctrl+C again to force an emergency stop)...");
            cancel_clone.cancel();
        }
    });

    let result = orchestrator.run(plan.id, config, cancel).await?;

    match result {
        OrchestratorResult::Completed => {
            println!("\nPlan completed successfully! All tasks passed.");
        }
        OrchestratorResult::Failed { failed_tasks } => {
            println!("\nPlan failed. Tasks left failed:");
            for task in &failed_tasks {
                println!("  - {task}");
            }
            std::process::exit(1);
        }
        OrchestratorResult::BudgetExceeded { used, budget } => {
            println!("\nPlan stopped: budget exceeded (${used:.2}/${budget:.2} spent).");
            std::process::exit(3);
        }
        OrchestratorResult::Interrupted => {
            println!("\nPlan interrupted by signal. In-flight tasks drained.");
            std::process::exit(130);
        }
    }

    let progress = orchestrator.plan_progress(plan.id).context("plan vanished after run")?;
    println!(
        "final tally: {} completed, {} failed, {} cancelled (of {})",
        progress.completed,
        progress.failed,
        progress.cancelled,
        progress.total()
    );

    Ok(())
}

