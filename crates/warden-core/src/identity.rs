//! Worker context and identity (spec §4.8, C8).
//!
//! A [`WorkerContext`] is immutable for the lifetime of the worker it
//! identifies. The anti-pattern this module exists to forbid: regenerating
//! a worker's identity (in particular its [`WorkerId`]) on every access,
//! which breaks update routing in [`crate::monitor`] (a queued [`Update`]
//! addressed to a worker id that no longer matches anything silently goes
//! nowhere). Capture it once, at worker start, and thread the same value
//! through every subsequent call.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WardenError;

/// Stable, unique identifier for a worker (a deployed task or a spawned
/// subtask agent).
pub type WorkerId = Uuid;

/// The kind of entity that rooted the current spawn chain.
///
/// See spec Glossary: "the kind of entity that rooted the current chain".
/// This is distinct from the immediate parent's kind -- a subtask spawned
/// from another subtask still reports `Subtask` here; [`crate::safety`]
/// is what translates `Subtask` into an effective `Agent` depth policy
/// when the *root* of the chain was not an orchestrator (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnContext {
    /// Rooted by the top-level orchestrator deploying a plan task.
    Orchestrator,
    /// Rooted by a standalone agent session (no plan involved).
    Agent,
    /// Derived: this worker is itself a subtask of another worker.
    Subtask,
}

impl std::fmt::Display for SpawnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Orchestrator => "orchestrator",
            Self::Agent => "agent",
            Self::Subtask => "subtask",
        };
        f.write_str(s)
    }
}

/// The kind of entity that owns a worker, for permission routing (C6) and
/// message delivery (C2/C5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Orchestrator,
    Worker,
}

/// Identifies the owner of a worker, i.e. who its updates and permission
/// escalations route to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub owner_id: WorkerId,
    pub owner_type: OwnerType,
}

/// Immutable per-worker identity (spec §3 `WorkerContext`).
///
/// Constructed once via [`WorkerContext::new`] and never mutated. Cloning
/// is cheap and intentional -- many components need their own copy of the
/// same identity, not a shared mutable one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerContext {
    pub worker_id: WorkerId,
    pub task_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub worktree_path: PathBuf,
    pub depth: u32,
    pub spawn_context: SpawnContext,
    pub owner: Option<Owner>,
}

impl WorkerContext {
    /// Build a new worker context.
    ///
    /// This is the *only* place a [`WorkerContext`] is constructed. Callers
    /// must capture the returned value once and pass it by reference or
    /// clone from then on -- never call this twice for the same logical
    /// worker to "refresh" it (see module docs).
    pub fn new(
        worker_id: WorkerId,
        task_id: Option<Uuid>,
        plan_id: Option<Uuid>,
        worktree_path: PathBuf,
        depth: u32,
        spawn_context: SpawnContext,
        owner: Option<Owner>,
    ) -> Self {
        Self {
            worker_id,
            task_id,
            plan_id,
            worktree_path,
            depth,
            spawn_context,
            owner,
        }
    }

    /// Build the default context for a standalone (non-orchestrator,
    /// non-plan) session.
    ///
    /// Uses a stable per-session id derived from `session_seed` (a caller
    /// supplied, already-unique value -- e.g. a timestamp or a UUID
    /// generated once at process start) rather than generating a fresh
    /// random id on every call, per the no-regeneration rule above.
    ///
    /// Fails with [`WardenError::NoWorkspace`] if `worktree_path` is
    /// `None` and none of the fallback candidates resolve -- this core
    /// never falls back to the process's current working directory (spec
    /// §9 "Process-working-directory fallback... replaced by a hard
    /// failure with a precise diagnostic").
    pub fn standalone(
        session_seed: &str,
        worktree_path: Option<PathBuf>,
        main_workspace: Option<PathBuf>,
    ) -> Result<Self, WardenError> {
        let resolved = worktree_path.clone().or_else(|| main_workspace.clone());
        let Some(resolved) = resolved else {
            return Err(WardenError::NoWorkspace {
                constructor_worktree: None,
                worker_context_worktree: worktree_path.map(|p| p.display().to_string()),
                main_workspace: main_workspace.map(|p| p.display().to_string()),
                rejected: "no worktree path and no main workspace supplied".to_string(),
            });
        };

        let worker_id = stable_standalone_id(session_seed);

        Ok(Self::new(
            worker_id,
            None,
            None,
            resolved,
            0,
            SpawnContext::Agent,
            None,
        ))
    }
}

/// Derive a stable `standalone-<seed>` worker id.
///
/// A real UUID is preferable to a string id so the rest of the system can
/// treat `WorkerId` uniformly as a `Uuid`; we derive a deterministic v5
/// UUID from the seed so the same seed always yields the same id within a
/// process (matching spec §4.8's "stable per-session id").
fn stable_standalone_id(session_seed: &str) -> WorkerId {
    const NAMESPACE: Uuid = Uuid::from_bytes([
        0x9a, 0x7a, 0x11, 0xcb, 0x3b, 0x3f, 0x4c, 0x0d, 0x8b, 0x57, 0x2f, 0x0e, 0x2b, 0x6d, 0x1a,
        0x04,
    ]);
    Uuid::new_v5(&NAMESPACE, session_seed.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standalone_requires_some_workspace() {
        let err = WorkerContext::standalone("seed-1", None, None).unwrap_err();
        assert!(matches!(err, WardenError::NoWorkspace { .. }));
    }

    #[test]
    fn standalone_falls_back_to_main_workspace() {
        let ctx =
            WorkerContext::standalone("seed-1", None, Some(PathBuf::from("/work"))).unwrap();
        assert_eq!(ctx.worktree_path, PathBuf::from("/work"));
        assert_eq!(ctx.depth, 0);
        assert_eq!(ctx.spawn_context, SpawnContext::Agent);
    }

    #[test]
    fn standalone_id_is_stable_for_same_seed() {
        let a = WorkerContext::standalone("same-seed", None, Some(PathBuf::from("/w"))).unwrap();
        let b = WorkerContext::standalone("same-seed", None, Some(PathBuf::from("/w"))).unwrap();
        assert_eq!(a.worker_id, b.worker_id);
    }

    #[test]
    fn standalone_id_differs_for_different_seeds() {
        let a = WorkerContext::standalone("seed-a", None, Some(PathBuf::from("/w"))).unwrap();
        let b = WorkerContext::standalone("seed-b", None, Some(PathBuf::from("/w"))).unwrap();
        assert_ne!(a.worker_id, b.worker_id);
    }

    #[test]
    fn spawn_context_display() {
        assert_eq!(SpawnContext::Orchestrator.to_string(), "orchestrator");
        assert_eq!(SpawnContext::Agent.to_string(), "agent");
        assert_eq!(SpawnContext::Subtask.to_string(), "subtask");
    }
}
