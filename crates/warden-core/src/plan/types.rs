//! Plan/task/worker value types (spec §4.1, §4.4).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PlanId = Uuid;
pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Draft,
    Active,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub description: String,
    pub base_branch: Option<String>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub plan_id: PlanId,
    pub name: String,
    pub description: String,
    pub agent: Option<String>,
    pub dependencies: HashSet<TaskId>,
    pub target_files: Option<HashSet<String>>,
    pub priority: Priority,
    pub parallel_group: Option<String>,
    pub status: TaskStatus,
    pub worker_id: Option<Uuid>,
    /// Retry attempt counter, recorded at the task (not worker) level per
    /// the Open Question resolution in SPEC_FULL.md.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(plan_id: PlanId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_id,
            name: name.into(),
            description: description.into(),
            agent: None,
            dependencies: HashSet::new(),
            target_files: None,
            priority: Priority::default(),
            parallel_group: None,
            status: TaskStatus::Pending,
            worker_id: None,
            attempt: 0,
            created_at: Utc::now(),
        }
    }

    /// A task is *ready* iff it's `pending` and every dependency is
    /// `completed` (spec §4.4 "Readiness").
    pub fn is_ready(&self, tasks: &std::collections::HashMap<TaskId, Task>) -> bool {
        self.status == TaskStatus::Pending
            && self
                .dependencies
                .iter()
                .all(|dep| tasks.get(dep).map(|t| t.status == TaskStatus::Completed).unwrap_or(false))
    }
}

/// A deployed worker, produced by [`super::PlanManager::deploy`] /
/// [`super::PlanManager::retry_task`] (spec §4.4, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: Uuid,
    pub task_id: TaskId,
    pub plan_id: PlanId,
    pub parent_worker_id: Uuid,
    pub worktree_path: std::path::PathBuf,
    pub branch: String,
    pub deployed_at: DateTime<Utc>,
}

/// Aggregate counts by status for a plan (spec's SPEC_FULL.md-added
/// `plan_progress` read operation, mirroring the teacher's
/// `PlanProgress`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlanProgress {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl PlanProgress {
    pub fn total(&self) -> usize {
        self.pending + self.ready + self.running + self.completed + self.failed + self.cancelled
    }

    pub fn is_complete(&self) -> bool {
        self.total() > 0 && self.pending == 0 && self.ready == 0 && self.running == 0 && self.failed == 0
    }
}
