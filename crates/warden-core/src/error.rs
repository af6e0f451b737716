//! The error taxonomy shared across the orchestration core (spec §7).
//!
//! Individual components (safety limits, subtask manager, plan graph,
//! permission router) define their own `thiserror` enums for the failure
//! modes specific to them; [`WardenError`] is the umbrella type the tool
//! surface (C7) converts everything into before handing a result back to
//! an agent runtime, since tool calls must never throw.

use uuid::Uuid;

/// Umbrella error kind for the orchestration core.
///
/// Each variant corresponds to one kind named in spec §7. Variants carry
/// enough context to build a human-readable hint without re-querying
/// state that may have since changed.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    #[error("cannot spawn deeper: depth {parent_depth} is at or beyond the limit for {context:?} (max {max_depth})")]
    DepthLimitExceeded {
        parent_depth: u32,
        max_depth: u32,
        context: crate::identity::SpawnContext,
    },

    #[error("cycle detected in subtask ancestry: {detail}")]
    CycleDetected { detail: String },

    #[error("rate limit exceeded for worker {worker_id}: {count} spawns in the last 60s (limit {limit})")]
    RateLimitExceeded {
        worker_id: Uuid,
        count: usize,
        limit: usize,
    },

    #[error("total subtask limit exceeded for worker {worker_id}: {count} (limit {limit})")]
    TotalLimitExceeded {
        worker_id: Uuid,
        count: usize,
        limit: usize,
    },

    #[error("parallel subtask limit exceeded for worker {worker_id}: {running} running (limit {limit})")]
    ParallelLimitExceeded {
        worker_id: Uuid,
        running: usize,
        limit: usize,
    },

    #[error("unauthorised: {detail}")]
    Unauthorised { detail: String },

    #[error("not found: {detail}")]
    NotFound { detail: String },

    #[error(
        "no workspace root could be determined; candidates considered: \
         constructor worktree={constructor_worktree:?}, worker-context worktree={worker_context_worktree:?}, \
         main workspace={main_workspace:?}; rejected: {rejected}"
    )]
    NoWorkspace {
        constructor_worktree: Option<String>,
        worker_context_worktree: Option<String>,
        main_workspace: Option<String>,
        rejected: String,
    },

    #[error("invalid working directory {path:?}: {reason}")]
    InvalidWorkingDirectory { path: String, reason: String },

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("agent runtime error: {0}")]
    AgentRuntimeError(String),
}

impl WardenError {
    /// Short machine-readable kind tag, useful for tool-result payloads
    /// that need a stable string discriminant (e.g. JSON `error.kind`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DepthLimitExceeded { .. } => "depth_limit_exceeded",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::TotalLimitExceeded { .. } => "total_limit_exceeded",
            Self::ParallelLimitExceeded { .. } => "parallel_limit_exceeded",
            Self::Unauthorised { .. } => "unauthorised",
            Self::NotFound { .. } => "not_found",
            Self::NoWorkspace { .. } => "no_workspace",
            Self::InvalidWorkingDirectory { .. } => "invalid_working_directory",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::AgentRuntimeError(_) => "agent_runtime_error",
        }
    }
}
