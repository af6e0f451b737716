//! Plan / Task Graph (spec §4.4, C4).
//!
//! Readiness computation and priority tie-breaking mirror the teacher's
//! `task_db::get_ready_tasks` / `is_plan_complete` / `get_plan_progress`,
//! translated from SQL to an in-memory `HashMap<TaskId, Task>` plus a
//! `Vec<TaskId>` insertion-order list for tie-breaking. `deploy` /
//! `cancel_task` / `retry_task` follow the same transition-graph
//! discipline as the teacher's `TaskStateMachine`: an explicit valid-edge
//! table, reject everything else.

mod types;

pub use types::{Plan, PlanId, PlanProgress, PlanStatus, Priority, Task, TaskId, TaskStatus, Worker};

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use crate::error::WardenError;
use crate::worktree::WorktreeManager;

/// Options accepted by [`PlanManager::add_task`].
#[derive(Debug, Clone, Default)]
pub struct AddTaskOptions {
    pub name: Option<String>,
    pub agent: Option<String>,
    pub dependencies: std::collections::HashSet<TaskId>,
    pub target_files: Option<std::collections::HashSet<String>>,
    pub priority: Priority,
    pub parallel_group: Option<String>,
}

/// Options accepted by [`PlanManager::deploy`] / [`PlanManager::retry_task`].
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// The worker requesting the deployment; becomes the new worker's
    /// `parentWorkerId` so update routing is preserved (spec §4.4).
    pub parent_worker_id: Uuid,
}

struct PlanState {
    plan: Plan,
    /// Insertion order, used to break readiness ties (spec §4.4
    /// "ties broken by insertion order").
    task_order: Vec<TaskId>,
    tasks: HashMap<TaskId, Task>,
}

/// In-memory plan/task graph.
pub struct PlanManager {
    plans: Mutex<HashMap<PlanId, PlanState>>,
    worktrees: Option<WorktreeManager>,
}

impl PlanManager {
    pub fn new(worktrees: Option<WorktreeManager>) -> Self {
        Self {
            plans: Mutex::new(HashMap::new()),
            worktrees,
        }
    }

    pub fn create_plan(&self, name: impl Into<String>, description: impl Into<String>, base_branch: Option<String>) -> Plan {
        let plan = Plan {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            base_branch,
            status: PlanStatus::Draft,
            created_at: Utc::now(),
        };
        self.plans.lock().unwrap().insert(
            plan.id,
            PlanState {
                plan: plan.clone(),
                task_order: Vec::new(),
                tasks: HashMap::new(),
            },
        );
        plan
    }

    pub fn add_task(&self, plan_id: PlanId, description: impl Into<String>, opts: AddTaskOptions) -> Result<Task, WardenError> {
        let mut plans = self.plans.lock().unwrap();
        let state = plans.get_mut(&plan_id).ok_or_else(|| WardenError::NotFound {
            detail: format!("plan {plan_id} not found"),
        })?;

        let mut task = Task::new(plan_id, opts.name.unwrap_or_default(), description);
        task.agent = opts.agent;
        task.dependencies = opts.dependencies;
        task.target_files = opts.target_files;
        task.priority = opts.priority;
        task.parallel_group = opts.parallel_group;

        state.task_order.push(task.id);
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    pub fn get_tasks(&self, plan_id: Option<PlanId>) -> Vec<Task> {
        let plans = self.plans.lock().unwrap();
        match plan_id {
            Some(id) => plans
                .get(&id)
                .map(|s| s.task_order.iter().filter_map(|id| s.tasks.get(id).cloned()).collect())
                .unwrap_or_default(),
            None => plans
                .values()
                .flat_map(|s| s.task_order.iter().filter_map(|id| s.tasks.get(id).cloned()))
                .collect(),
        }
    }

    /// Tasks that are `pending` with all dependencies `completed` (spec
    /// §4.4 "Readiness"), in insertion order.
    pub fn get_ready_tasks(&self, plan_id: Option<PlanId>) -> Vec<Task> {
        let plans = self.plans.lock().unwrap();
        let collect = |state: &PlanState| -> Vec<Task> {
            state
                .task_order
                .iter()
                .filter_map(|id| state.tasks.get(id))
                .filter(|t| t.is_ready(&state.tasks))
                .cloned()
                .collect()
        };
        match plan_id {
            Some(id) => plans.get(&id).map(collect).unwrap_or_default(),
            None => plans.values().flat_map(|s| collect(s)).collect(),
        }
    }

    /// Deploy the highest-priority ready task (or `task_id` if given),
    /// producing a [`Worker`] (spec §4.4). `opts.parent_worker_id` becomes
    /// the new worker's `parentWorkerId` so update routing is preserved.
    pub fn deploy(&self, task_id: Option<TaskId>, opts: DeployOptions) -> Result<Worker, WardenError> {
        let mut plans = self.plans.lock().unwrap();

        let (plan_id, chosen) = match task_id {
            Some(id) => {
                let plan_id = plans
                    .iter()
                    .find(|(_, s)| s.tasks.contains_key(&id))
                    .map(|(pid, _)| *pid)
                    .ok_or_else(|| WardenError::NotFound {
                        detail: format!("task {id} not found"),
                    })?;
                (plan_id, id)
            }
            None => {
                let mut best: Option<(PlanId, TaskId, Priority, usize)> = None;
                for (plan_id, state) in plans.iter() {
                    for (order_idx, tid) in state.task_order.iter().enumerate() {
                        let Some(task) = state.tasks.get(tid) else { continue };
                        if !task.is_ready(&state.tasks) {
                            continue;
                        }
                        let better = match &best {
                            None => true,
                            Some((_, _, best_priority, best_idx)) => {
                                task.priority > *best_priority
                                    || (task.priority == *best_priority && order_idx < *best_idx)
                            }
                        };
                        if better {
                            best = Some((*plan_id, *tid, task.priority, order_idx));
                        }
                    }
                }
                let (plan_id, task_id, ..) = best.ok_or_else(|| WardenError::NotFound {
                    detail: "no ready task available to deploy".to_string(),
                })?;
                (plan_id, task_id)
            }
        };

        let state = plans.get_mut(&plan_id).expect("plan_id resolved above");
        {
            let task = state.tasks.get(&chosen).ok_or_else(|| WardenError::NotFound {
                detail: format!("task {chosen} not found"),
            })?;
            if task.status != TaskStatus::Pending {
                return Err(WardenError::Unauthorised {
                    detail: format!("task {chosen} is not pending (status={:?})", task.status),
                });
            }
            if !task.is_ready(&state.tasks) {
                return Err(WardenError::Unauthorised {
                    detail: format!(
                        "task {chosen} is not ready: unmet dependencies"
                    ),
                });
            }
        }
        let task = state.tasks.get_mut(&chosen).expect("checked above");

        let worker_id = Uuid::new_v4();
        let branch = WorktreeManager::branch_name(&state.plan.name, &task.name);
        let worktree_path = match &self.worktrees {
            Some(wm) => wm
                .create_worktree(&branch)
                .map(|info| info.path)
                .unwrap_or_else(|_| std::path::PathBuf::from(format!("./{branch}"))),
            None => std::path::PathBuf::from(format!("./{branch}")),
        };

        task.status = TaskStatus::Running;
        task.worker_id = Some(worker_id);

        Ok(Worker {
            worker_id,
            task_id: chosen,
            plan_id,
            parent_worker_id: opts.parent_worker_id,
            worktree_path,
            branch,
            deployed_at: Utc::now(),
        })
    }

    /// Requires `caller` to be the task's `parentWorkerId` or the
    /// orchestrator itself (spec §4.4 "Authorisation").
    pub fn complete_task(&self, worker_id: Uuid, caller: Uuid, parent_worker_id: Uuid, orchestrator_id: Uuid) -> Result<(), WardenError> {
        if caller != parent_worker_id && caller != orchestrator_id {
            return Err(WardenError::Unauthorised {
                detail: format!("caller {caller} is not the parent of worker {worker_id} nor the orchestrator"),
            });
        }
        let mut plans = self.plans.lock().unwrap();
        let task = plans
            .values_mut()
            .flat_map(|s| s.tasks.values_mut())
            .find(|t| t.worker_id == Some(worker_id))
            .ok_or_else(|| WardenError::NotFound {
                detail: format!("no task deployed to worker {worker_id}"),
            })?;
        task.status = TaskStatus::Completed;
        Ok(())
    }

    /// `remove=false`: `running -> cancelled -> pending` (resettable).
    /// `remove=true`: deletes the task outright.
    pub fn cancel_task(&self, task_id: TaskId, remove: bool) -> Result<Option<Uuid>, WardenError> {
        let mut plans = self.plans.lock().unwrap();
        let state = plans
            .values_mut()
            .find(|s| s.tasks.contains_key(&task_id))
            .ok_or_else(|| WardenError::NotFound {
                detail: format!("task {task_id} not found"),
            })?;

        if remove {
            let task = state.tasks.remove(&task_id);
            state.task_order.retain(|id| *id != task_id);
            return Ok(task.and_then(|t| t.worker_id));
        }

        let task = state.tasks.get_mut(&task_id).expect("checked above");
        let detached_worker = task.worker_id.take();
        task.status = TaskStatus::Pending;
        Ok(detached_worker)
    }

    /// Clear error state, bump the attempt counter, and re-deploy,
    /// re-associating the new worker with the same parent (spec §4.4
    /// "Retry").
    pub fn retry_task(&self, task_id: TaskId, opts: DeployOptions) -> Result<Worker, WardenError> {
        {
            let mut plans = self.plans.lock().unwrap();
            let state = plans
                .values_mut()
                .find(|s| s.tasks.contains_key(&task_id))
                .ok_or_else(|| WardenError::NotFound {
                    detail: format!("task {task_id} not found"),
                })?;
            let task = state.tasks.get_mut(&task_id).expect("checked above");
            if task.status != TaskStatus::Failed {
                return Err(WardenError::Unauthorised {
                    detail: format!("task {task_id} is not failed (status={:?})", task.status),
                });
            }
            task.status = TaskStatus::Pending;
            task.attempt += 1;
            task.worker_id = None;
        }
        self.deploy(Some(task_id), opts)
    }

    /// Counts by status for a plan, mirroring the teacher's
    /// `get_plan_progress` (SPEC_FULL.md-added read operation).
    pub fn plan_progress(&self, plan_id: PlanId) -> Result<PlanProgress, WardenError> {
        let plans = self.plans.lock().unwrap();
        let state = plans.get(&plan_id).ok_or_else(|| WardenError::NotFound {
            detail: format!("plan {plan_id} not found"),
        })?;
        let mut progress = PlanProgress::default();
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Pending => progress.pending += 1,
                TaskStatus::Ready => progress.ready += 1,
                TaskStatus::Running => progress.running += 1,
                TaskStatus::Completed => progress.completed += 1,
                TaskStatus::Failed => progress.failed += 1,
                TaskStatus::Cancelled => progress.cancelled += 1,
            }
        }
        Ok(progress)
    }

    pub fn get_plan(&self, plan_id: PlanId) -> Option<Plan> {
        self.plans.lock().unwrap().get(&plan_id).map(|s| s.plan.clone())
    }

    pub fn set_plan_status(&self, plan_id: PlanId, status: PlanStatus) -> Result<(), WardenError> {
        let mut plans = self.plans.lock().unwrap();
        let state = plans.get_mut(&plan_id).ok_or_else(|| WardenError::NotFound {
            detail: format!("plan {plan_id} not found"),
        })?;
        state.plan.status = status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PlanManager {
        PlanManager::new(None)
    }

    #[test]
    fn readiness_requires_dependencies_completed() {
        let mgr = manager();
        let plan = mgr.create_plan("p", "desc", None);
        let a = mgr.add_task(plan.id, "first", AddTaskOptions::default()).unwrap();
        let mut opts = AddTaskOptions::default();
        opts.dependencies.insert(a.id);
        let b = mgr.add_task(plan.id, "second", opts).unwrap();

        let ready_ids: Vec<_> = mgr.get_ready_tasks(Some(plan.id)).into_iter().map(|t| t.id).collect();
        assert_eq!(ready_ids, vec![a.id]);

        mgr.deploy(Some(a.id), DeployOptions { parent_worker_id: Uuid::new_v4() }).unwrap();
        mgr.complete_task(
            mgr.get_tasks(Some(plan.id)).iter().find(|t| t.id == a.id).unwrap().worker_id.unwrap(),
            Uuid::nil(),
            Uuid::nil(),
            Uuid::nil(),
        )
        .unwrap();

        let ready_ids: Vec<_> = mgr.get_ready_tasks(Some(plan.id)).into_iter().map(|t| t.id).collect();
        assert_eq!(ready_ids, vec![b.id]);
    }

    #[test]
    fn deploy_with_explicit_task_id_rejects_unmet_dependencies() {
        let mgr = manager();
        let plan = mgr.create_plan("p", "desc", None);
        let a = mgr.add_task(plan.id, "first", AddTaskOptions::default()).unwrap();
        let mut opts = AddTaskOptions::default();
        opts.dependencies.insert(a.id);
        let b = mgr.add_task(plan.id, "second", opts).unwrap();

        // `b` is `Pending` but not ready: its dependency on `a` hasn't
        // completed yet. Deploying it by explicit id must be rejected the
        // same way an implicit (`None`) deploy would never pick it.
        let err = mgr
            .deploy(Some(b.id), DeployOptions { parent_worker_id: Uuid::new_v4() })
            .unwrap_err();
        assert!(matches!(err, WardenError::Unauthorised { .. }));

        // Once `a` completes, `b` becomes ready and the same call succeeds.
        let worker_a = mgr
            .deploy(Some(a.id), DeployOptions { parent_worker_id: Uuid::new_v4() })
            .unwrap();
        mgr.complete_task(worker_a.worker_id, worker_a.parent_worker_id, worker_a.parent_worker_id, Uuid::nil())
            .unwrap();
        mgr.deploy(Some(b.id), DeployOptions { parent_worker_id: Uuid::new_v4() }).unwrap();
    }

    #[test]
    fn deploy_without_task_id_picks_highest_priority_then_insertion_order() {
        let mgr = manager();
        let plan = mgr.create_plan("p", "desc", None);
        let mut low_opts = AddTaskOptions::default();
        low_opts.priority = Priority::Low;
        let _low = mgr.add_task(plan.id, "low", low_opts).unwrap();
        let mut high_opts = AddTaskOptions::default();
        high_opts.priority = Priority::High;
        let high = mgr.add_task(plan.id, "high", high_opts).unwrap();

        let worker = mgr.deploy(None, DeployOptions { parent_worker_id: Uuid::new_v4() }).unwrap();
        assert_eq!(worker.task_id, high.id);
    }

    #[test]
    fn complete_task_requires_parent_or_orchestrator() {
        let mgr = manager();
        let plan = mgr.create_plan("p", "desc", None);
        let task = mgr.add_task(plan.id, "t", AddTaskOptions::default()).unwrap();
        let parent = Uuid::new_v4();
        let worker = mgr.deploy(Some(task.id), DeployOptions { parent_worker_id: parent }).unwrap();

        let intruder = Uuid::new_v4();
        let err = mgr.complete_task(worker.worker_id, intruder, parent, Uuid::nil()).unwrap_err();
        assert!(matches!(err, WardenError::Unauthorised { .. }));

        mgr.complete_task(worker.worker_id, parent, parent, Uuid::nil()).unwrap();
    }

    #[test]
    fn cancel_without_remove_resets_to_pending() {
        let mgr = manager();
        let plan = mgr.create_plan("p", "desc", None);
        let task = mgr.add_task(plan.id, "t", AddTaskOptions::default()).unwrap();
        mgr.deploy(Some(task.id), DeployOptions { parent_worker_id: Uuid::new_v4() }).unwrap();

        let detached = mgr.cancel_task(task.id, false).unwrap();
        assert!(detached.is_some());
        let refreshed = mgr.get_tasks(Some(plan.id)).into_iter().find(|t| t.id == task.id).unwrap();
        assert_eq!(refreshed.status, TaskStatus::Pending);
        assert!(refreshed.worker_id.is_none());
    }

    #[test]
    fn cancel_with_remove_deletes_task() {
        let mgr = manager();
        let plan = mgr.create_plan("p", "desc", None);
        let task = mgr.add_task(plan.id, "t", AddTaskOptions::default()).unwrap();
        mgr.cancel_task(task.id, true).unwrap();
        assert!(mgr.get_tasks(Some(plan.id)).is_empty());
    }

    #[test]
    fn retry_requires_failed_status_and_bumps_attempt() {
        let mgr = manager();
        let plan = mgr.create_plan("p", "desc", None);
        let task = mgr.add_task(plan.id, "t", AddTaskOptions::default()).unwrap();
        let parent = Uuid::new_v4();

        let err = mgr.retry_task(task.id, DeployOptions { parent_worker_id: parent }).unwrap_err();
        assert!(matches!(err, WardenError::Unauthorised { .. }));

        mgr.deploy(Some(task.id), DeployOptions { parent_worker_id: parent }).unwrap();
        {
            let mut plans = mgr.plans.lock().unwrap();
            let state = plans.get_mut(&plan.id).unwrap();
            state.tasks.get_mut(&task.id).unwrap().status = TaskStatus::Failed;
        }
        let worker = mgr.retry_task(task.id, DeployOptions { parent_worker_id: parent }).unwrap();
        assert_eq!(worker.parent_worker_id, parent);
        let refreshed = mgr.get_tasks(Some(plan.id)).into_iter().find(|t| t.id == task.id).unwrap();
        assert_eq!(refreshed.attempt, 1);
    }

    #[test]
    fn plan_progress_counts_by_status() {
        let mgr = manager();
        let plan = mgr.create_plan("p", "desc", None);
        mgr.add_task(plan.id, "t1", AddTaskOptions::default()).unwrap();
        mgr.add_task(plan.id, "t2", AddTaskOptions::default()).unwrap();
        let progress = mgr.plan_progress(plan.id).unwrap();
        assert_eq!(progress.pending, 2);
        assert!(!progress.is_complete());
    }
}
