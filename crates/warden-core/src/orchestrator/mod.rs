//! Orchestrator Service (spec §4.5, C5): a thin facade composing C3+C4,
//! owning the worker registry and standalone-parent push handlers.
//!
//! The async loop in [`Orchestrator::run`] carries over the teacher's
//! `run_orchestrator` near-verbatim in shape -- semaphore-gated
//! concurrency, an mpsc completion channel, a cancellation drain with a
//! deadline, a budget check, and a termination check -- generalized so it
//! dispatches plan tasks *and* accepts ad hoc subtask spawns routed
//! through C3, with the teacher's harness lookup generalized to the
//! [`crate::collaborators::AgentRunner`] collaborator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collaborators::AgentRunner;
use crate::error::WardenError;
use crate::identity::{SpawnContext, WorkerContext};
use crate::monitor::UpdateBus;
use crate::plan::{DeployOptions, PlanId, PlanManager, PlanProgress, Task, TaskStatus, Worker};
use crate::safety::{EmergencyScope, EmergencyStopResult, EmergencyStopSubscriber, SafetyLimits};
use crate::subtask::{SubTask, SubTaskManager, SubTaskStatus};

/// Configuration for [`Orchestrator::run`] (mirrors the teacher's
/// `OrchestratorConfig`).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_agents: usize,
    pub task_timeout: Duration,
    /// Maximum retry attempts for a failed task before it's left failed
    /// for an operator to handle (no "escalated" status of its own here;
    /// spec's task-status enum stays at six members).
    pub max_retries: u32,
    /// Optional token/dollar budget for the plan, checked against C1's
    /// cost ledger each loop iteration (SPEC_FULL.md "budget-aware
    /// orchestration loop").
    pub token_budget: Option<f64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_agents: 20,
            task_timeout: Duration::from_secs(600),
            max_retries: 3,
            token_budget: None,
        }
    }
}

/// Result of running the orchestrator loop to completion (mirrors the
/// teacher's `OrchestratorResult`).
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorResult {
    Completed,
    Failed { failed_tasks: Vec<String> },
    BudgetExceeded { used: f64, budget: f64 },
    Interrupted,
}

type WorkerChangeListener = Arc<dyn Fn(&Worker) + Send + Sync>;

struct TaskDone {
    task_id: Uuid,
    task_name: String,
    worker_id: Uuid,
    outcome: Result<(), WardenError>,
}

/// The orchestrator service facade.
pub struct Orchestrator {
    pub orchestrator_id: Uuid,
    plans: Arc<PlanManager>,
    subtasks: Arc<SubTaskManager>,
    monitor: Arc<UpdateBus>,
    safety: Arc<SafetyLimits>,
    agent_runner: Arc<dyn AgentRunner>,
    /// Workers currently deployed, keyed by worker id -- the "worker
    /// registry" spec §4.5 says C5 owns.
    workers: Mutex<HashMap<Uuid, Worker>>,
    worker_change_listeners: Mutex<Vec<WorkerChangeListener>>,
}

impl Orchestrator {
    pub fn new(
        plans: Arc<PlanManager>,
        subtasks: Arc<SubTaskManager>,
        monitor: Arc<UpdateBus>,
        safety: Arc<SafetyLimits>,
        agent_runner: Arc<dyn AgentRunner>,
    ) -> Self {
        let subtasks_for_stop = Arc::clone(&subtasks);
        safety.on_emergency_stop(EmergencyStopSubscriber::new(move |scope, affected| {
            subtasks_for_stop.handle_emergency_stop(scope, affected);
        }));
        Self {
            orchestrator_id: Uuid::new_v4(),
            plans,
            subtasks,
            monitor,
            safety,
            agent_runner,
            workers: Mutex::new(HashMap::new()),
            worker_change_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to every worker-registry change (spec §4.5
    /// `onDidChangeWorkers`).
    pub fn on_did_change_workers(&self, listener: impl Fn(&Worker) + Send + Sync + 'static) {
        self.worker_change_listeners.lock().unwrap().push(Arc::new(listener));
    }

    fn publish_worker_change(&self, worker: &Worker) {
        for listener in self.worker_change_listeners.lock().unwrap().iter() {
            listener(worker);
        }
    }

    /// Queue a message into a running worker's input channel (spec §4.4
    /// `sendMessageToWorker`, §4.5 "responsible for sending messages to
    /// running workers"). Non-blocking (spec §5 "Suspension points").
    pub fn send_message_to_worker(&self, worker_id: Uuid, message: impl Into<String>) {
        self.monitor
            .queue_update(crate::monitor::Update::idle(worker_id, worker_id, message));
    }

    /// Initiate an emergency-stop spanning plans (spec §4.5, §4.1). The
    /// subtask manager is notified via the subscriber wired up in
    /// [`Orchestrator::new`], before any ledger cleanup.
    pub fn emergency_stop(&self, scope: EmergencyScope, reason: impl Into<String>) -> EmergencyStopResult {
        self.safety.emergency_stop(scope, reason, chrono::Utc::now())
    }

    /// Sweep the worker registry for tasks left `running` whose worker is
    /// no longer tracked as active (SPEC_FULL.md-added restart/orphan
    /// recovery). Since this core holds no durable state across process
    /// restarts (spec §1 Non-goals), "orphaned" here means: a task the
    /// plan graph believes is `running` but for which the orchestrator's
    /// in-memory worker registry has no entry -- the scenario a crashed
    /// and relaunched-in-place process would see. Eligible tasks are
    /// retried; tasks already at `max_retries` are left `failed` for an
    /// operator (no silent infinite retry loop).
    pub fn reap_orphaned(&self, plan_id: PlanId, config: &OrchestratorConfig) -> Vec<Uuid> {
        let mut reaped = Vec::new();
        let workers = self.workers.lock().unwrap();
        for task in self.plans.get_tasks(Some(plan_id)) {
            if task.status != TaskStatus::Running {
                continue;
            }
            let Some(worker_id) = task.worker_id else { continue };
            if workers.contains_key(&worker_id) {
                continue;
            }
            tracing::warn!(task_id = %task.id, worker_id = %worker_id, "reaping orphaned task with no live worker");
            let _ = self.plans.cancel_task(task.id, false);
            if task.attempt < config.max_retries {
                if self
                    .plans
                    .retry_task(task.id, DeployOptions { parent_worker_id: self.orchestrator_id })
                    .is_ok()
                {
                    reaped.push(task.id);
                }
            }
        }
        reaped
    }

    /// Run the orchestrator for a plan to completion (spec §4.5; the
    /// teacher's `run_orchestrator` loop shape, generalized to the
    /// in-memory plan graph and `AgentRunner` collaborator).
    pub async fn run(&self, plan_id: PlanId, config: OrchestratorConfig, cancel: CancellationToken) -> Result<OrchestratorResult, WardenError> {
        self.reap_orphaned(plan_id, &config);

        let semaphore = Arc::new(Semaphore::new(config.max_agents));
        let (tx, mut rx) = mpsc::channel::<TaskDone>(config.max_agents * 2);
        let mut in_flight: usize = 0;

        loop {
            if cancel.is_cancelled() {
                tracing::info!(plan_id = %plan_id, "orchestrator cancelled, draining in-flight tasks");
                let drain_deadline = tokio::time::Instant::now() + Duration::from_secs(10);
                while in_flight > 0 {
                    match tokio::time::timeout_at(drain_deadline, rx.recv()).await {
                        Ok(Some(done)) => {
                            in_flight -= 1;
                            self.handle_task_done(&done);
                        }
                        _ => break,
                    }
                }
                if in_flight > 0 {
                    tracing::warn!(plan_id = %plan_id, remaining = in_flight, "drain timeout expired");
                }
                return Ok(OrchestratorResult::Interrupted);
            }

            while let Ok(done) = rx.try_recv() {
                in_flight -= 1;
                self.handle_task_done(&done);
            }

            if let Some(budget) = config.token_budget {
                let used = self.plan_cost(plan_id);
                if used >= budget {
                    tracing::warn!(plan_id = %plan_id, used, budget, "token budget exceeded, stopping plan");
                    return Ok(OrchestratorResult::BudgetExceeded { used, budget });
                }
            }

            let progress = self.plans.plan_progress(plan_id)?;
            if progress.is_complete() {
                return Ok(OrchestratorResult::Completed);
            }

            if progress.pending == 0 && progress.ready == 0 && progress.running == 0 && in_flight == 0 {
                let failed: Vec<String> = self
                    .plans
                    .get_tasks(Some(plan_id))
                    .into_iter()
                    .filter(|t| t.status == TaskStatus::Failed)
                    .map(|t| t.name)
                    .collect();
                if !failed.is_empty() {
                    return Ok(OrchestratorResult::Failed { failed_tasks: failed });
                }
            }

            let ready = self.plans.get_ready_tasks(Some(plan_id));
            let spawned_any = !ready.is_empty();

            for task in ready {
                let permit = Arc::clone(&semaphore).acquire_owned().await.map_err(|_| {
                    WardenError::AgentRuntimeError("orchestrator semaphore closed".to_string())
                })?;

                let worker = self.plans.deploy(
                    Some(task.id),
                    DeployOptions {
                        parent_worker_id: self.orchestrator_id,
                    },
                )?;
                self.workers.lock().unwrap().insert(worker.worker_id, worker.clone());
                self.publish_worker_change(&worker);

                let task_id = task.id;
                let task_name = task.name.clone();
                let worker_id = worker.worker_id;
                let worker_context = WorkerContext::new(
                    worker.worker_id,
                    Some(task.id),
                    Some(plan_id),
                    worker.worktree_path.clone(),
                    0,
                    SpawnContext::Orchestrator,
                    None,
                );
                let agent_runner = Arc::clone(&self.agent_runner);
                let safety = Arc::clone(&self.safety);
                let tx_clone = tx.clone();
                let task_timeout = config.task_timeout;
                let as_subtask = task_as_subtask(&task, &worker);
                let cancel_for_task = cancel.clone();

                in_flight += 1;

                tokio::spawn(async move {
                    let run_result = tokio::time::timeout(
                        task_timeout,
                        agent_runner.run(&as_subtask, &worker_context, cancel_for_task),
                    )
                    .await;

                    let outcome = match run_result {
                        Ok(agent_outcome) => {
                            let (usage, model) = match &agent_outcome {
                                crate::collaborators::AgentOutcome::Completed { usage, model, .. } => {
                                    (*usage, model.clone())
                                }
                                crate::collaborators::AgentOutcome::Failed { usage, model, .. } => {
                                    (*usage, model.clone())
                                }
                            };
                            safety.track_subtask_cost(crate::safety::CostEntry {
                                sub_task_id: worker_id,
                                input_tokens: usage.input,
                                output_tokens: usage.output,
                                model,
                                timestamp: chrono::Utc::now(),
                            });
                            match agent_outcome {
                                crate::collaborators::AgentOutcome::Completed { .. } => Ok(()),
                                crate::collaborators::AgentOutcome::Failed { error, .. } => {
                                    Err(WardenError::AgentRuntimeError(error))
                                }
                            }
                        }
                        Err(_) => Err(WardenError::Timeout(task_timeout)),
                    };

                    drop(permit);
                    let _ = tx_clone
                        .send(TaskDone {
                            task_id,
                            task_name,
                            worker_id,
                            outcome,
                        })
                        .await;
                });
            }

            if in_flight > 0 {
                tokio::select! {
                    done = rx.recv() => {
                        if let Some(done) = done {
                            in_flight -= 1;
                            self.handle_task_done(&done);
                        }
                    }
                    _ = cancel.cancelled() => { continue; }
                }
            } else if !spawned_any {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                    _ = cancel.cancelled() => { continue; }
                }
            }
        }
    }

    fn handle_task_done(&self, done: &TaskDone) {
        self.workers.lock().unwrap().remove(&done.worker_id);
        match &done.outcome {
            Ok(()) => {
                tracing::info!(task_id = %done.task_id, task_name = %done.task_name, "task completed");
                let _ = self.plans.complete_task(done.worker_id, self.orchestrator_id, self.orchestrator_id, self.orchestrator_id);
            }
            Err(err) => {
                tracing::warn!(task_id = %done.task_id, task_name = %done.task_name, error = %err, "task failed");
                let _ = self.plans.cancel_task(done.task_id, false);
            }
        }
    }

    fn plan_cost(&self, plan_id: PlanId) -> f64 {
        let workers = self.workers.lock().unwrap();
        workers
            .values()
            .filter(|w| w.plan_id == plan_id)
            .map(|w| self.safety.get_total_cost_for_worker(w.worker_id))
            .sum()
    }

    pub fn plan_progress(&self, plan_id: PlanId) -> Result<PlanProgress, WardenError> {
        self.plans.plan_progress(plan_id)
    }
}

/// Wrap a deployed plan task's worker as the [`SubTask`] shape
/// `AgentRunner::run` expects, so the orchestrator's loop can drive a
/// plan task through the same collaborator boundary C3 uses for spawned
/// subtasks (spec §4.5; plan tasks have no subtask record of their own).
fn task_as_subtask(task: &Task, worker: &Worker) -> SubTask {
    SubTask {
        id: worker.worker_id,
        parent_worker_id: worker.parent_worker_id,
        parent_task_id: Some(task.id),
        plan_id: Some(task.plan_id),
        worktree_path: worker.worktree_path.clone(),
        base_branch: None,
        agent_type: task.agent.clone().unwrap_or_else(|| "general".to_string()),
        prompt: task.description.clone(),
        expected_output: String::new(),
        target_files: task
            .target_files
            .as_ref()
            .map(|files| files.iter().cloned().collect()),
        current_depth: 0,
        depth: 0,
        spawn_context: SpawnContext::Orchestrator,
        status: SubTaskStatus::Running,
        created_at: worker.deployed_at,
        result: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::NoopAgentRunner;
    use crate::plan::AddTaskOptions;
    use crate::safety::SafetyLimitsConfig;

    fn orchestrator() -> Orchestrator {
        let safety = Arc::new(SafetyLimits::new(SafetyLimitsConfig::default()));
        let monitor = Arc::new(UpdateBus::new());
        let subtasks = Arc::new(SubTaskManager::new(
            Arc::clone(&safety),
            Arc::clone(&monitor),
            Arc::new(NoopAgentRunner::completing_with("ok")),
        ));
        Orchestrator::new(
            Arc::new(PlanManager::new(None)),
            subtasks,
            monitor,
            safety,
            Arc::new(NoopAgentRunner::completing_with("ok")),
        )
    }

    #[tokio::test]
    async fn run_completes_a_plan_with_no_dependencies() {
        let orch = orchestrator();
        let plan = orch.plans.create_plan("demo", "desc", None);
        orch.plans.add_task(plan.id, "only task", AddTaskOptions::default()).unwrap();

        let result = orch
            .run(plan.id, OrchestratorConfig::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, OrchestratorResult::Completed);
    }

    #[tokio::test]
    async fn run_respects_immediate_cancellation() {
        let orch = orchestrator();
        let plan = orch.plans.create_plan("demo", "desc", None);
        orch.plans.add_task(plan.id, "t", AddTaskOptions::default()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = orch.run(plan.id, OrchestratorConfig::default(), cancel).await.unwrap();
        assert_eq!(result, OrchestratorResult::Interrupted);
    }

    #[test]
    fn reap_orphaned_retries_a_running_task_with_no_live_worker() {
        let orch = orchestrator();
        let plan = orch.plans.create_plan("demo", "desc", None);
        let task = orch.plans.add_task(plan.id, "t", AddTaskOptions::default()).unwrap();
        orch.plans.deploy(Some(task.id), DeployOptions { parent_worker_id: Uuid::new_v4() }).unwrap();

        let reaped = orch.reap_orphaned(plan.id, &OrchestratorConfig::default());
        assert_eq!(reaped, vec![task.id]);
    }

    #[test]
    fn worker_change_listener_is_notified_on_deploy() {
        let orch = orchestrator();
        let plan = orch.plans.create_plan("demo", "desc", None);
        let task = orch.plans.add_task(plan.id, "t", AddTaskOptions::default()).unwrap();

        let seen = Arc::new(Mutex::new(0usize));
        let seen_clone = Arc::clone(&seen);
        orch.on_did_change_workers(move |_| *seen_clone.lock().unwrap() += 1);

        let worker = orch.plans.deploy(Some(task.id), DeployOptions { parent_worker_id: Uuid::new_v4() }).unwrap();
        orch.workers.lock().unwrap().insert(worker.worker_id, worker.clone());
        orch.publish_worker_change(&worker);
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
