//! The `GitOps` trait: the seam for git plumbing (spec's "out of scope:
//! git/worktree implementation").
//!
//! [`crate::worktree::WorktreeManager`] still owns worktree *path*
//! allocation for worker contexts (spec §4.8 requires unique worktree
//! paths per deployment); this trait is the read-only slice of actual
//! git inspection a host collaborator may want, grounded on the
//! teacher's `WorktreeManager` branch-inspection helper but trimmed to
//! what the spec's collaborator interface calls for.

use std::path::Path;

use async_trait::async_trait;

#[async_trait]
pub trait GitOps: Send + Sync {
    /// Best-effort current branch name for a worktree, or `None` if it
    /// can't be determined (detached HEAD, not a git repo, `git` missing).
    async fn current_branch(&self, worktree_path: &Path) -> Option<String>;
}

// Compile-time assertion: GitOps must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn GitOps) {}
};

/// A `GitOps` that never resolves a branch. Used where a host has no
/// git backend wired up.
pub struct NoopGitOps;

#[async_trait]
impl GitOps for NoopGitOps {
    async fn current_branch(&self, _worktree_path: &Path) -> Option<String> {
        None
    }
}
