//! Permission request/decision records (spec §3 `Permission Request`,
//! §6 wire record).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::identity::WorkerId;

/// The kind of sensitive operation being requested (spec §3: `kind ∈
/// {read, write, shell, mcp, …}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    Read,
    Write,
    Shell,
    Mcp,
    /// Any kind declared by a host extension that this core doesn't name
    /// explicitly -- the spec's `…` in the kind enumeration.
    Other(String),
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Shell => write!(f, "shell"),
            Self::Mcp => write!(f, "mcp"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A boundary check for a sensitive operation, to be routed up the
/// parent chain (spec §3, §4.6).
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub id: Uuid,
    pub origin_worker_id: WorkerId,
    pub origin_depth: u32,
    pub kind: PermissionKind,
    pub action: String,
    pub target: Option<String>,
    pub context: HashMap<String, String>,
    pub is_sensitive: bool,
    pub timeout: Duration,
    pub created_at: DateTime<Utc>,
}

impl PermissionRequest {
    /// The memoisation key the router uses: `kind:action:target` (spec
    /// §4.6 step 1).
    pub fn memo_key(&self) -> (PermissionKind, String, Option<String>) {
        (self.kind.clone(), self.action.clone(), self.target.clone())
    }

    /// `true` if `context` marks this request as occurring inside the
    /// requester's own worktree (spec §4.6 step 3, `write` case).
    pub fn is_in_worktree(&self) -> bool {
        self.context
            .get("isInWorktree")
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}

/// How long a decision should be remembered (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remember {
    /// Memoised for the rest of this session only.
    Session,
    /// Persisted beyond the session (handed to `warden-store` if wired up).
    Always,
    /// Never memoised; always re-ask.
    Never,
}

/// Who made the final call on a request, for audit/debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecidedBy {
    /// Matched a prior session-memoised decision.
    Memo,
    /// `handleAsParent`'s pure auto-approval policy.
    AutoPolicy,
    /// The owning worker explicitly approved/denied.
    Parent,
    /// Escalated all the way to the human operator.
    User,
    /// Cancelled before a decision was reached.
    Cancelled,
}

/// The outcome of routing a [`PermissionRequest`] (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionKind {
    Approve,
    Deny,
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub decision: DecisionKind,
    pub decided_by: DecidedBy,
    pub reason: Option<String>,
    pub remember: Option<Remember>,
}

impl Decision {
    pub fn approve(decided_by: DecidedBy, remember: Option<Remember>) -> Self {
        Self {
            decision: DecisionKind::Approve,
            decided_by,
            reason: None,
            remember,
        }
    }

    pub fn deny(decided_by: DecidedBy, reason: impl Into<String>) -> Self {
        Self {
            decision: DecisionKind::Deny,
            decided_by,
            reason: Some(reason.into()),
            remember: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.decision == DecisionKind::Approve
    }
}

/// The in-process queue message exchanged between the router and a
/// parent owner (spec §6 "Update-message wire record").
#[derive(Debug, Clone)]
pub enum WireMessage {
    PermissionRequest {
        permission_request_id: Uuid,
        kind: PermissionKind,
        action: String,
        target: Option<String>,
        context: HashMap<String, String>,
        is_sensitive: bool,
        origin_worker_id: WorkerId,
        origin_depth: u32,
    },
    PermissionResponse {
        permission_request_id: Uuid,
        decision: DecisionKind,
        reason: Option<String>,
        remember: Option<Remember>,
    },
}
