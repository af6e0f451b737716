//! Tool Surface (spec §4.7, C7): the narrow, stable set of operations
//! presented to an agent runtime. Every operation returns a structured
//! `Result`; none ever throw to the caller (spec §4.7 "errors are
//! returned, not thrown").
//!
//! A plain request/response struct per operation, the way the teacher's
//! tool-server wrapper (out of scope here, per spec §1) would present
//! language-neutral JSON-like payloads -- except this is the boundary
//! *inside* the core, not the wire format a harness actually speaks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collaborators::Notifier;
use crate::discovery::{AgentDiscovery, AgentFilter};
use crate::error::WardenError;
use crate::identity::{SpawnContext, WorkerContext};
use crate::monitor::{Update, UpdateBus};
use crate::permission::{Decision, PermissionKind, PermissionRequest, PermissionRouter};
use crate::plan::{AddTaskOptions, DeployOptions, Plan, PlanId, PlanManager, Task, TaskId, Worker};
use crate::subtask::{CreateSubTaskOpts, SubTask, SubTaskManager, SubTaskStatus};

/// `spawn_subtask`'s non-blocking return shape (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnedSubtask {
    pub task_id: Uuid,
    pub status: String,
}

/// `report_completion`'s outcome, distinguishing a real completion from
/// the "not a subtask" warning path (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReportCompletionOutcome {
    Recorded,
    NotASubtask { warning: String },
}

/// Snapshot of a subtask returned by `get_worker_status` (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: Uuid,
    pub status: String,
    pub result: Option<String>,
}

/// The tool surface. Holds `Arc`s to the collaborating components (spec
/// §4.5 "thin facade") and exposes the §4.7 operation table as methods.
pub struct ToolSurface {
    plans: Arc<PlanManager>,
    subtasks: Arc<SubTaskManager>,
    monitor: Arc<UpdateBus>,
    permission: Arc<PermissionRouter>,
    discovery: Arc<Mutex<AgentDiscovery>>,
    notifier: Arc<dyn Notifier>,
    orchestrator_id: Uuid,
}

impl ToolSurface {
    pub fn new(
        plans: Arc<PlanManager>,
        subtasks: Arc<SubTaskManager>,
        monitor: Arc<UpdateBus>,
        permission: Arc<PermissionRouter>,
        discovery: Arc<Mutex<AgentDiscovery>>,
        notifier: Arc<dyn Notifier>,
        orchestrator_id: Uuid,
    ) -> Self {
        Self {
            plans,
            subtasks,
            monitor,
            permission,
            discovery,
            notifier,
            orchestrator_id,
        }
    }

    pub fn list_agents(&self, filter: AgentFilter) -> Vec<String> {
        self.discovery
            .lock()
            .unwrap()
            .list(filter)
            .into_iter()
            .map(|a| a.id.clone())
            .collect()
    }

    /// `spawn_subtask(agentType, prompt, expectedOutput, targetFiles?, blocking, model?)`.
    ///
    /// Calls C3's `create_sub_task`, then either awaits execution
    /// (blocking) or starts it in the background and returns immediately
    /// with `{taskId, status:"spawned"}`. Standalone-parent push wiring
    /// (for a caller with no owner) is the orchestrator's (C5)
    /// responsibility, not this surface's.
    pub async fn spawn_subtask(
        &self,
        caller: &WorkerContext,
        agent_type: impl Into<String>,
        prompt: impl Into<String>,
        expected_output: impl Into<String>,
        target_files: Option<Vec<String>>,
        blocking: bool,
        cancel: CancellationToken,
    ) -> Result<SpawnedSubtask, WardenError> {
        let subtask = self.subtasks.create_sub_task(CreateSubTaskOpts {
            parent_worker_id: caller.worker_id,
            parent_sub_task_id: if caller.spawn_context == SpawnContext::Subtask {
                caller.task_id
            } else {
                None
            },
            parent_task_id: caller.task_id,
            plan_id: caller.plan_id,
            worktree_path: caller.worktree_path.clone(),
            base_branch: None,
            agent_type: agent_type.into(),
            prompt: prompt.into(),
            expected_output: expected_output.into(),
            target_files,
            current_depth: caller.depth,
            spawn_context: caller.spawn_context,
        })?;

        if blocking {
            self.subtasks
                .execute_sub_task(subtask.id, cancel)
                .await?;
        } else {
            let subtasks = Arc::clone(&self.subtasks);
            let id = subtask.id;
            tokio::spawn(async move {
                let _ = subtasks.execute_sub_task(id, cancel).await;
            });
        }

        Ok(SpawnedSubtask {
            task_id: subtask.id,
            status: "spawned".to_string(),
        })
    }

    /// `spawn_parallel_subtasks([...], blocking)`: fan out several
    /// `spawn_subtask` calls; `blocking=true` awaits all of them.
    pub async fn spawn_parallel_subtasks(
        &self,
        caller: &WorkerContext,
        requests: Vec<(String, String, String, Option<Vec<String>>)>,
        blocking: bool,
        cancel: CancellationToken,
    ) -> Vec<Result<SpawnedSubtask, WardenError>> {
        let mut out = Vec::with_capacity(requests.len());
        for (agent_type, prompt, expected_output, target_files) in requests {
            out.push(
                self.spawn_subtask(
                    caller,
                    agent_type,
                    prompt,
                    expected_output,
                    target_files,
                    blocking,
                    cancel.clone(),
                )
                .await,
            );
        }
        out
    }

    /// `await_subtasks([taskIds], timeout)`: poll each task id to terminal
    /// or timeout.
    pub async fn await_subtasks(&self, task_ids: &[Uuid], timeout: Duration) -> Vec<Option<SubTask>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut results: Vec<Option<SubTask>> = vec![None; task_ids.len()];
        loop {
            let mut all_terminal = true;
            for (i, id) in task_ids.iter().enumerate() {
                if results[i].as_ref().map(|s: &SubTask| s.status.is_terminal()).unwrap_or(false) {
                    continue;
                }
                match self.subtasks.get_sub_task(*id) {
                    Some(subtask) => {
                        let terminal = subtask.status.is_terminal();
                        results[i] = Some(subtask);
                        if !terminal {
                            all_terminal = false;
                        }
                    }
                    None => all_terminal = false,
                }
            }
            if all_terminal || tokio::time::Instant::now() >= deadline {
                return results;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// `report_completion(commitMessage!, output, status)`.
    ///
    /// An empty `commit_message` fails with an instructive error. If the
    /// caller has no `task_id` of its own, it isn't a subtask -- return a
    /// warning instead of mutating anything (spec §4.7).
    pub fn report_completion(
        &self,
        caller: &WorkerContext,
        commit_message: &str,
        output: String,
        status: SubTaskStatus,
    ) -> Result<ReportCompletionOutcome, WardenError> {
        if commit_message.trim().is_empty() {
            return Err(WardenError::AgentRuntimeError(
                "report_completion requires a non-empty commitMessage describing the change"
                    .to_string(),
            ));
        }

        let Some(own_subtask_id) = caller.task_id.filter(|_| caller.spawn_context == SpawnContext::Subtask) else {
            return Ok(ReportCompletionOutcome::NotASubtask {
                warning: format!(
                    "worker {} has no subtask id; report_completion is a no-op outside a subtask",
                    caller.worker_id
                ),
            });
        };

        self.subtasks
            .update_status(own_subtask_id, status, Some(format!("{commit_message}\n\n{output}")));
        Ok(ReportCompletionOutcome::Recorded)
    }

    /// `notify_parent(type, message, progress?)`: queue an update via C2.
    pub fn notify_parent(&self, caller: &WorkerContext, message: impl Into<String>, progress: Option<u8>) {
        let sub_task_id = caller.task_id.unwrap_or(caller.worker_id);
        let update = match progress {
            Some(pct) => Update::progress(sub_task_id, caller.worker_id, pct, message),
            None => Update::idle(sub_task_id, caller.worker_id, message),
        };
        self.monitor.queue_update(update);
    }

    /// `poll_subtask_updates()`: drain C2 for the caller.
    pub fn poll_subtask_updates(&self, caller: &WorkerContext) -> Vec<Update> {
        self.monitor.consume_updates(caller.worker_id)
    }

    /// `get_worker_status(workerId)`: snapshot of a subtask.
    pub fn get_worker_status(&self, task_id: Uuid) -> Option<WorkerStatus> {
        self.subtasks.get_sub_task(task_id).map(|s| WorkerStatus {
            id: s.id,
            status: format!("{:?}", s.status).to_lowercase(),
            result: s.result,
        })
    }

    /// Full event history for a subtask (SPEC_FULL.md-added "Agent event
    /// log"), independent of `poll_subtask_updates`'s FIFO queue -- useful
    /// for a CLI `log` command run after the queue has already been
    /// drained by the owning parent.
    pub fn worker_event_log(&self, sub_task_id: Uuid) -> Vec<Update> {
        self.monitor.event_log(sub_task_id)
    }

    /// `send_message_to_worker(workerId, message)`: C5 passthrough.
    ///
    /// This core's C5 owns the running-worker input channels; at the C7
    /// layer we can only route a notification-shaped update, since a
    /// live worker handle isn't addressable from here.
    pub fn send_message_to_worker(&self, worker_id: Uuid, message: impl Into<String>) {
        self.monitor.queue_update(Update::idle(worker_id, worker_id, message));
    }

    /// Route a sensitive operation through C6 before the caller may
    /// proceed with it (spec §1 "Sensitive operations route through C6
    /// before execution").
    pub async fn request_permission(
        &self,
        caller: &WorkerContext,
        kind: PermissionKind,
        action: impl Into<String>,
        target: Option<String>,
        context: HashMap<String, String>,
        is_sensitive: bool,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Decision {
        let req = PermissionRequest {
            id: Uuid::new_v4(),
            origin_worker_id: caller.worker_id,
            origin_depth: caller.depth,
            kind,
            action: action.into(),
            target,
            context,
            is_sensitive,
            timeout,
            created_at: chrono::Utc::now(),
        };
        self.permission
            .route_permission(req, caller, self.notifier.as_ref(), cancel)
            .await
    }

    // -- C4 passthroughs, with authorisation (spec §4.7) --

    pub fn plan_create(&self, name: impl Into<String>, description: impl Into<String>) -> Plan {
        self.plans.create_plan(name, description, None)
    }

    pub fn plan_add(&self, plan_id: PlanId, description: impl Into<String>, opts: AddTaskOptions) -> Result<Task, WardenError> {
        self.plans.add_task(plan_id, description, opts)
    }

    pub fn plan_list(&self, plan_id: Option<PlanId>) -> Vec<Task> {
        self.plans.get_tasks(plan_id)
    }

    pub fn plan_cancel(&self, task_id: TaskId, remove: bool) -> Result<Option<Uuid>, WardenError> {
        self.plans.cancel_task(task_id, remove)
    }

    pub fn plan_complete(&self, caller: &WorkerContext, worker_id: Uuid, parent_worker_id: Uuid) -> Result<(), WardenError> {
        self.plans
            .complete_task(worker_id, caller.worker_id, parent_worker_id, self.orchestrator_id)
    }

    pub fn plan_retry(&self, task_id: TaskId, caller: &WorkerContext) -> Result<Worker, WardenError> {
        self.plans.retry_task(
            task_id,
            DeployOptions {
                parent_worker_id: caller.worker_id,
            },
        )
    }

    pub fn plan_deploy(&self, task_id: Option<TaskId>, caller: &WorkerContext) -> Result<Worker, WardenError> {
        self.plans.deploy(
            task_id,
            DeployOptions {
                parent_worker_id: caller.worker_id,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LoggingNotifier, NoopAgentRunner};
    use crate::permission::PermissionPolicy;
    use crate::safety::{SafetyLimits, SafetyLimitsConfig};
    use std::path::PathBuf;

    fn surface() -> ToolSurface {
        let safety = Arc::new(SafetyLimits::new(SafetyLimitsConfig::default()));
        let monitor = Arc::new(UpdateBus::new());
        let subtasks = Arc::new(SubTaskManager::new(
            safety,
            Arc::clone(&monitor),
            Arc::new(NoopAgentRunner::completing_with("ok")),
        ));
        ToolSurface::new(
            Arc::new(PlanManager::new(None)),
            subtasks,
            monitor,
            Arc::new(PermissionRouter::new(PermissionPolicy::default())),
            Arc::new(Mutex::new(AgentDiscovery::new())),
            Arc::new(LoggingNotifier),
            Uuid::nil(),
        )
    }

    fn caller() -> WorkerContext {
        WorkerContext::new(
            Uuid::new_v4(),
            None,
            None,
            PathBuf::from("/tmp/worktree"),
            0,
            SpawnContext::Orchestrator,
            None,
        )
    }

    #[test]
    fn list_agents_enumerates_builtins() {
        let surface = surface();
        assert!(!surface.list_agents(AgentFilter::All).is_empty());
    }

    #[tokio::test]
    async fn spawn_subtask_blocking_runs_to_completion() {
        let surface = surface();
        let spawned = surface
            .spawn_subtask(
                &caller(),
                "@coder",
                "implement it",
                "a diff",
                None,
                true,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let status = surface.get_worker_status(spawned.task_id).unwrap();
        assert_eq!(status.status, "completed");
    }

    #[test]
    fn report_completion_rejects_empty_commit_message() {
        let surface = surface();
        let err = surface
            .report_completion(&caller(), "   ", "output".to_string(), SubTaskStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, WardenError::AgentRuntimeError(_)));
    }

    #[test]
    fn report_completion_warns_when_not_a_subtask() {
        let surface = surface();
        let outcome = surface
            .report_completion(&caller(), "fix bug", "output".to_string(), SubTaskStatus::Completed)
            .unwrap();
        assert!(matches!(outcome, ReportCompletionOutcome::NotASubtask { .. }));
    }

    #[test]
    fn notify_parent_and_poll_round_trips() {
        let surface = surface();
        let worker = caller();
        surface.notify_parent(&worker, "halfway there", Some(50));
        let updates = surface.poll_subtask_updates(&worker);
        assert_eq!(updates.len(), 1);
    }
}
