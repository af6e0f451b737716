//! The `Update` tagged union pushed from a subtask up to its parent
//! worker (spec §3, §4.2).

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Why a subtask update reports an error (spec §3 `error_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimit,
    Network,
    Auth,
    Fatal,
    Unknown,
}

/// Retry bookkeeping attached to a non-fatal error update (spec §3
/// `retry_info`).
#[derive(Debug, Clone)]
pub struct RetryInfo {
    pub attempt: u32,
    pub max_attempts: u32,
    pub will_retry: bool,
    pub next_retry_in_ms: Option<u64>,
}

/// The kind-specific payload of an [`Update`] (spec §3).
#[derive(Debug, Clone)]
pub enum UpdateKind {
    Progress {
        progress: u8,
        progress_report: String,
    },
    Idle {
        idle_reason: String,
    },
    Error {
        error: String,
        error_type: ErrorKind,
        retry_info: Option<RetryInfo>,
    },
    Failed {
        error: String,
    },
    Completed {
        result: String,
    },
}

impl UpdateKind {
    /// `completed` and `failed` are terminal: they are never dropped from
    /// a bounded queue (spec §4.2). `error` is also preserved regardless
    /// of `will_retry`, since an operator may want to see it even if a
    /// retry is already in flight.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpdateKind::Completed { .. } | UpdateKind::Failed { .. } | UpdateKind::Error { .. }
        )
    }
}

/// A single update emitted by a subtask toward its parent worker
/// (spec §3).
#[derive(Debug, Clone)]
pub struct Update {
    pub sub_task_id: Uuid,
    pub parent_worker_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: UpdateKind,
}

impl Update {
    pub fn progress(
        sub_task_id: Uuid,
        parent_worker_id: Uuid,
        progress: u8,
        progress_report: impl Into<String>,
    ) -> Self {
        Self {
            sub_task_id,
            parent_worker_id,
            timestamp: Utc::now(),
            kind: UpdateKind::Progress {
                progress,
                progress_report: progress_report.into(),
            },
        }
    }

    pub fn idle(sub_task_id: Uuid, parent_worker_id: Uuid, idle_reason: impl Into<String>) -> Self {
        Self {
            sub_task_id,
            parent_worker_id,
            timestamp: Utc::now(),
            kind: UpdateKind::Idle {
                idle_reason: idle_reason.into(),
            },
        }
    }

    pub fn completed(sub_task_id: Uuid, parent_worker_id: Uuid, result: impl Into<String>) -> Self {
        Self {
            sub_task_id,
            parent_worker_id,
            timestamp: Utc::now(),
            kind: UpdateKind::Completed {
                result: result.into(),
            },
        }
    }

    pub fn failed(sub_task_id: Uuid, parent_worker_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            sub_task_id,
            parent_worker_id,
            timestamp: Utc::now(),
            kind: UpdateKind::Failed {
                error: error.into(),
            },
        }
    }
}
