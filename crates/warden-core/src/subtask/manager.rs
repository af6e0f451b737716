//! The subtask manager (spec §4.3, C3): creation bottleneck, execution,
//! and terminal-transition bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use tokio_util::sync::CancellationToken;

use crate::collaborators::AgentRunner;
use crate::error::WardenError;
use crate::identity::{Owner, OwnerType, SpawnContext, WorkerContext};
use crate::monitor::{Update, UpdateBus};
use crate::safety::{hash_prompt, AncestryEntry, CostEntry, EmergencyScope, SafetyLimits};

use super::types::{CreateSubTaskOpts, SubTask, SubTaskResult, SubTaskStatus};

type ChangeListener = Arc<dyn Fn(&SubTask) + Send + Sync>;

/// Owns the lifecycle of every subtask from creation through a terminal
/// transition (spec §4.3). `createSubTask` is the single bottleneck
/// through which every safety check in C1 is routed.
pub struct SubTaskManager {
    safety: Arc<SafetyLimits>,
    bus: Arc<UpdateBus>,
    agent_runner: Arc<dyn AgentRunner>,
    subtasks: Mutex<HashMap<Uuid, SubTask>>,
    cancellations: Mutex<HashMap<Uuid, CancellationToken>>,
    change_listeners: Mutex<Vec<ChangeListener>>,
}

impl SubTaskManager {
    pub fn new(
        safety: Arc<SafetyLimits>,
        bus: Arc<UpdateBus>,
        agent_runner: Arc<dyn AgentRunner>,
    ) -> Self {
        Self {
            safety,
            bus,
            agent_runner,
            subtasks: Mutex::new(HashMap::new()),
            cancellations: Mutex::new(HashMap::new()),
            change_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to every subtask status transition (spec §4.3
    /// `onDidChangeSubTask`).
    pub fn on_did_change_sub_task(&self, listener: impl Fn(&SubTask) + Send + Sync + 'static) {
        self.change_listeners.lock().unwrap().push(Arc::new(listener));
    }

    fn notify_changed(&self, subtask: &SubTask) {
        for listener in self.change_listeners.lock().unwrap().iter() {
            listener(subtask);
        }
    }

    /// Create a subtask, running every C1 check in the order spec §4.3
    /// mandates. Fails closed: if any step errors, nothing is registered.
    pub fn create_sub_task(&self, opts: CreateSubTaskOpts) -> Result<SubTask, WardenError> {
        // 1. Depth.
        let depth = opts.current_depth + 1;
        self.safety
            .enforce_depth_limit(opts.current_depth, opts.spawn_context)?;

        // 2. Proposed ancestry + cycle detection.
        let id = Uuid::new_v4();
        let new_entry = AncestryEntry {
            sub_task_id: id,
            parent_sub_task_id: opts.parent_sub_task_id,
            worker_id: opts.parent_worker_id,
            plan_id: opts.plan_id,
            agent_type: opts.agent_type.clone(),
            prompt_hash: hash_prompt(&opts.prompt),
        };
        let proposed_chain = self
            .safety
            .propose_ancestry(opts.parent_sub_task_id, new_entry.clone());
        self.safety.detect_cycle(&proposed_chain)?;

        // 3. Rate / total / parallel.
        let now = std::time::Instant::now();
        self.safety.check_rate_limit(opts.parent_worker_id, now)?;
        let (total_count, running_count) = {
            let subtasks = self.subtasks.lock().unwrap();
            let mut total = 0usize;
            let mut running = 0usize;
            for st in subtasks.values() {
                if st.parent_worker_id == opts.parent_worker_id {
                    total += 1;
                    if st.status == SubTaskStatus::Running {
                        running += 1;
                    }
                }
            }
            (total, running)
        };
        self.safety
            .check_total_limit(opts.parent_worker_id, total_count)?;
        self.safety
            .check_parallel_limit(opts.parent_worker_id, running_count)?;

        // 4. Construct, register, persist.
        let subtask = SubTask {
            id,
            parent_worker_id: opts.parent_worker_id,
            parent_task_id: opts.parent_task_id,
            plan_id: opts.plan_id,
            worktree_path: opts.worktree_path,
            base_branch: opts.base_branch,
            agent_type: opts.agent_type,
            prompt: opts.prompt,
            expected_output: opts.expected_output,
            target_files: opts.target_files,
            current_depth: opts.current_depth,
            depth,
            spawn_context: opts.spawn_context,
            status: SubTaskStatus::Pending,
            created_at: chrono::Utc::now(),
            result: None,
        };

        self.safety.register_ancestry(new_entry);
        self.safety.record_spawn(opts.parent_worker_id, now);
        self.subtasks.lock().unwrap().insert(id, subtask.clone());
        self.bus.start_monitoring(id, opts.parent_worker_id);
        self.notify_changed(&subtask);

        Ok(subtask)
    }

    pub fn get_sub_task(&self, id: Uuid) -> Option<SubTask> {
        self.subtasks.lock().unwrap().get(&id).cloned()
    }

    /// Transition `pending -> running`, invoke the configured agent
    /// runner, then transition to a terminal state and push the matching
    /// `Update` to C2 (spec §4.3).
    ///
    /// The [`WorkerContext`] handed to the agent runner is this subtask's
    /// *own* identity, built here -- not the caller's -- tagged
    /// `SpawnContext::Subtask` per identity.rs's translation rule. This is
    /// what lets the subtask's own nested tool calls (a further
    /// `spawn_subtask` or `report_completion` issued from inside its own
    /// run) thread `parent_sub_task_id`/`task_id` correctly instead of
    /// silently losing them.
    pub async fn execute_sub_task(
        &self,
        id: Uuid,
        cancel: CancellationToken,
    ) -> Result<SubTaskResult, WardenError> {
        let subtask = {
            let mut subtasks = self.subtasks.lock().unwrap();
            let Some(subtask) = subtasks.get_mut(&id) else {
                return Err(WardenError::NotFound {
                    detail: format!("subtask {id} not found"),
                });
            };
            if subtask.status != SubTaskStatus::Pending {
                return Err(WardenError::AgentRuntimeError(format!(
                    "subtask {id} is not pending (status is {:?})",
                    subtask.status
                )));
            }
            subtask.status = SubTaskStatus::Running;
            subtask.clone()
        };
        self.notify_changed(&subtask);
        self.cancellations.lock().unwrap().insert(id, cancel.clone());

        let own_context = WorkerContext::new(
            subtask.id,
            Some(subtask.id),
            subtask.plan_id,
            subtask.worktree_path.clone(),
            subtask.depth,
            SpawnContext::Subtask,
            Some(Owner {
                owner_id: subtask.parent_worker_id,
                owner_type: OwnerType::Worker,
            }),
        );

        let outcome = self.agent_runner.run(&subtask, &own_context, cancel.clone()).await;

        use crate::collaborators::AgentOutcome;
        let (status, result_text, usage, model) = if cancel.is_cancelled() {
            (SubTaskStatus::Cancelled, None, None, None)
        } else {
            match outcome {
                AgentOutcome::Completed { result, usage, model } => {
                    (SubTaskStatus::Completed, Some(result), Some(usage), Some(model))
                }
                AgentOutcome::Failed { error, usage, model, .. } => {
                    (SubTaskStatus::Failed, Some(error), Some(usage), Some(model))
                }
            }
        };

        if let (Some(usage), Some(model)) = (usage, model) {
            self.safety.track_subtask_cost(CostEntry {
                sub_task_id: id,
                input_tokens: usage.input,
                output_tokens: usage.output,
                model,
                timestamp: chrono::Utc::now(),
            });
        }

        self.finish(id, status, result_text)
    }

    /// Apply a status transition. Ignored with a logged warning if the
    /// subtask is already terminal (spec §4.3 "A terminal transition is
    /// final").
    pub fn update_status(&self, id: Uuid, status: SubTaskStatus, result: Option<String>) {
        let changed = {
            let mut subtasks = self.subtasks.lock().unwrap();
            match subtasks.get_mut(&id) {
                Some(subtask) if subtask.status.is_terminal() => {
                    tracing::warn!(
                        sub_task_id = %id,
                        current = ?subtask.status,
                        attempted = ?status,
                        "ignoring status transition on terminal subtask"
                    );
                    None
                }
                Some(subtask) => {
                    subtask.status = status;
                    subtask.result = result.clone();
                    Some(subtask.clone())
                }
                None => None,
            }
        };
        if let Some(subtask) = changed {
            self.notify_changed(&subtask);
            if status.is_terminal() {
                self.push_terminal_update(&subtask);
                self.safety.clear_ancestry(id);
                self.cancellations.lock().unwrap().remove(&id);
            }
        }
    }

    fn finish(
        &self,
        id: Uuid,
        status: SubTaskStatus,
        result: Option<String>,
    ) -> Result<SubTaskResult, WardenError> {
        self.update_status(id, status, result.clone());
        Ok(SubTaskResult { status, result })
    }

    fn push_terminal_update(&self, subtask: &SubTask) {
        let update = match subtask.status {
            SubTaskStatus::Completed => Update::completed(
                subtask.id,
                subtask.parent_worker_id,
                subtask.result.clone().unwrap_or_default(),
            ),
            SubTaskStatus::Failed => Update::failed(
                subtask.id,
                subtask.parent_worker_id,
                subtask.result.clone().unwrap_or_default(),
            ),
            SubTaskStatus::Cancelled => Update::failed(
                subtask.id,
                subtask.parent_worker_id,
                "cancelled".to_string(),
            ),
            _ => return,
        };
        self.bus.queue_update(update);
    }

    /// Trip the cancellation token for a running subtask and mark it
    /// cancelled. No-op if the subtask is already terminal or has no
    /// live cancellation token (it hasn't started running yet).
    pub fn cancel_sub_task(&self, id: Uuid) {
        if let Some(token) = self.cancellations.lock().unwrap().get(&id) {
            token.cancel();
        }
        self.update_status(id, SubTaskStatus::Cancelled, None);
    }

    /// Translate an emergency-stop scope into cancellation-token trips
    /// for every affected subtask (spec §4.1 "listeners (C3 primarily)
    /// ... translate scope into cancellation-token trips").
    pub fn handle_emergency_stop(&self, _scope: &EmergencyScope, affected: &[Uuid]) {
        for id in affected {
            self.cancel_sub_task(*id);
        }
    }
}
