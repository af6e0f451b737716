//! Worktree path allocation for worker deployment (spec §4.8, §5
//! "the orchestrator is responsible for producing unique worktree paths
//! per deployment").
//!
//! Trimmed from the teacher's `worktree::WorktreeManager`: container
//! isolation, merge-conflict resolution, and branch deletion are dropped
//! (they belong to "git/worktree implementation" and "sandboxing of tool
//! execution", both out of scope per spec §1). What's left is exactly
//! what [`crate::identity::WorkerContext::worktree_path`] needs: create a
//! uniquely named worktree, remove it, and compute a branch name.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("not a git repository: {0}")]
    NotAGitRepo(PathBuf),

    #[error("git command failed: {message}")]
    GitCommand {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {command} failed (exit {code}): {stderr}")]
    GitExit {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Information about a single allocated worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}

/// Allocates git worktrees for worker deployment.
///
/// Git serialises worktree mutation on a lock file in the shared object
/// store; this manager serialises all mutating operations through its
/// own mutex so concurrently-deploying workers don't race on that lock.
#[derive(Debug)]
pub struct WorktreeManager {
    repo_path: PathBuf,
    worktree_base: PathBuf,
    git_lock: Arc<Mutex<()>>,
}

impl Clone for WorktreeManager {
    fn clone(&self) -> Self {
        Self {
            repo_path: self.repo_path.clone(),
            worktree_base: self.worktree_base.clone(),
            git_lock: Arc::clone(&self.git_lock),
        }
    }
}

impl WorktreeManager {
    /// Build a manager rooted at `repo_path`. Fails if `repo_path` is not
    /// inside a git repository.
    pub fn new(
        repo_path: impl Into<PathBuf>,
        worktree_base: Option<PathBuf>,
    ) -> Result<Self, WorktreeError> {
        let repo_path = repo_path.into();

        let output = Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(&repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git rev-parse".to_string(),
                source: e,
            })?;
        if !output.status.success() {
            return Err(WorktreeError::NotAGitRepo(repo_path));
        }

        let worktree_base = worktree_base.unwrap_or_else(|| {
            let repo_name = repo_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("repo");
            repo_path
                .parent()
                .unwrap_or(Path::new("."))
                .join(format!("{repo_name}-warden-worktrees"))
        });

        Ok(Self {
            repo_path,
            worktree_base,
            git_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn worktree_base(&self) -> &Path {
        &self.worktree_base
    }

    /// Build the conventional branch name for a plan/task (or
    /// plan/subtask) pair, matching the teacher's `gator/<plan>/<task>`
    /// convention with the product rename applied.
    pub fn branch_name(plan_name: &str, unit_name: &str) -> String {
        format!("warden/{plan_name}/{unit_name}")
    }

    /// Create a uniquely-placed worktree for `branch_name`, creating the
    /// branch if it doesn't already exist. Each call with a distinct
    /// `branch_name` is guaranteed a distinct path under
    /// [`WorktreeManager::worktree_base`] (spec §5 "unique worktree paths
    /// per deployment").
    pub fn create_worktree(&self, branch_name: &str) -> Result<WorktreeInfo, WorktreeError> {
        let _lock = self.git_lock.lock().unwrap_or_else(|e| e.into_inner());

        let dir_name = branch_name.replace('/', "--");
        let worktree_path = self.worktree_base.join(dir_name);

        if !self.worktree_base.exists() {
            std::fs::create_dir_all(&self.worktree_base).map_err(|e| WorktreeError::GitCommand {
                message: format!(
                    "failed to create worktree base directory: {}",
                    self.worktree_base.display()
                ),
                source: e,
            })?;
        }

        let branch_exists = self.branch_exists(branch_name)?;
        let output = if branch_exists {
            Command::new("git")
                .args(["worktree", "add"])
                .arg(&worktree_path)
                .arg(branch_name)
                .current_dir(&self.repo_path)
                .output()
        } else {
            Command::new("git")
                .args(["worktree", "add", "-b"])
                .arg(branch_name)
                .arg(&worktree_path)
                .current_dir(&self.repo_path)
                .output()
        }
        .map_err(|e| WorktreeError::GitCommand {
            message: "failed to run git worktree add".to_string(),
            source: e,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(WorktreeError::GitExit {
                command: "worktree add".to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(WorktreeInfo {
            path: worktree_path,
            branch: branch_name.to_string(),
        })
    }

    /// Remove a worktree by path. Idempotent: a missing path is a no-op.
    pub fn remove_worktree(&self, path: &Path) -> Result<(), WorktreeError> {
        let _lock = self.git_lock.lock().unwrap_or_else(|e| e.into_inner());

        let output = Command::new("git")
            .args(["worktree", "remove", "--force"])
            .arg(path)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git worktree remove".to_string(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stderr.contains("is not a working tree") {
                return Ok(());
            }
            return Err(WorktreeError::GitExit {
                command: "worktree remove".to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        Ok(())
    }

    fn branch_exists(&self, branch_name: &str) -> Result<bool, WorktreeError> {
        let output = Command::new("git")
            .args(["show-ref", "--verify", "--quiet"])
            .arg(format!("refs/heads/{branch_name}"))
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| WorktreeError::GitCommand {
                message: "failed to run git show-ref".to_string(),
                source: e,
            })?;
        Ok(output.status.success())
    }
}
