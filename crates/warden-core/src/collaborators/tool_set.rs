//! The `ToolSetFactory` trait: produces the tool surface an agent runner
//! exposes to a model for a given subtask (spec §4.3: "the worker tool
//! set scoped to the subtask's worktree").
//!
//! The actual tool-call transport (C7's in-process protocol) is out of
//! scope for this crate; this trait is the seam a host extension plugs
//! into.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::identity::WorkerContext;

/// An opaque handle to a materialized tool set. Concrete shape is owned
/// by the host; this core only needs to know it exists and where it's
/// rooted.
#[derive(Debug, Clone)]
pub struct ToolHandle {
    pub worktree_path: PathBuf,
}

#[async_trait]
pub trait ToolSetFactory: Send + Sync {
    /// Build the tool set a subtask's agent should see, scoped to
    /// `worker_context`'s worktree.
    async fn build(&self, worker_context: &WorkerContext) -> ToolHandle;
}

// Compile-time assertion: ToolSetFactory must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ToolSetFactory) {}
};

/// A tool set factory that hands back a handle rooted at the worker
/// context's worktree and nothing else.
pub struct NoopToolSetFactory;

#[async_trait]
impl ToolSetFactory for NoopToolSetFactory {
    async fn build(&self, worker_context: &WorkerContext) -> ToolHandle {
        ToolHandle {
            worktree_path: worker_context.worktree_path.clone(),
        }
    }
}
