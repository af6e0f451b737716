//! SubTask record and creation options (spec §3, §4.3).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::identity::SpawnContext;

/// Lifecycle status of a subtask. Terminal states (`Completed`, `Failed`,
/// `Cancelled`) are final: once reached, no further transition is
/// accepted (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SubTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubTaskStatus::Completed | SubTaskStatus::Failed | SubTaskStatus::Cancelled
        )
    }
}

/// A unit of recursive delegation from one worker to another agent
/// (spec §3).
#[derive(Debug, Clone)]
pub struct SubTask {
    pub id: Uuid,
    pub parent_worker_id: Uuid,
    pub parent_task_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub worktree_path: PathBuf,
    pub base_branch: Option<String>,
    pub agent_type: String,
    pub prompt: String,
    pub expected_output: String,
    pub target_files: Option<Vec<String>>,
    /// Depth of the parent that spawned this subtask.
    pub current_depth: u32,
    /// `current_depth + 1`.
    pub depth: u32,
    pub spawn_context: SpawnContext,
    pub status: SubTaskStatus,
    pub created_at: DateTime<Utc>,
    pub result: Option<String>,
}

/// Options accepted by [`crate::subtask::SubTaskManager::create_sub_task`]
/// (spec §4.3).
#[derive(Debug, Clone)]
pub struct CreateSubTaskOpts {
    pub parent_worker_id: Uuid,
    pub parent_sub_task_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub worktree_path: PathBuf,
    pub base_branch: Option<String>,
    pub agent_type: String,
    pub prompt: String,
    pub expected_output: String,
    pub target_files: Option<Vec<String>>,
    pub current_depth: u32,
    pub spawn_context: SpawnContext,
}

/// The terminal result of running a subtask (spec §4.3
/// `executeSubTask(...) -> SubTaskResult`).
#[derive(Debug, Clone)]
pub struct SubTaskResult {
    pub status: SubTaskStatus,
    pub result: Option<String>,
}
