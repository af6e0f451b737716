//! Parent auto-approval policy (spec §4.6 step 3, `handleAsParent`).
//!
//! Split the way the teacher's `token::guard` splits an env/IO-touching
//! public function from a pure, fully-testable inner one: this module is
//! a pure, synchronous function over a plain data policy, with no async
//! runtime or lock needed to exercise it.

use super::types::{Decision, DecidedBy, PermissionKind, PermissionRequest, Remember};

/// The auto-approval defaults a parent applies before ever escalating
/// (spec §4.6 step 3; defaults sourced from [`crate::discovery`] C9, may
/// be overridden per host).
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    /// Target prefixes that auto-approve a `read` request.
    pub safe_read_patterns: Vec<String>,
    /// Target prefixes that auto-approve a `write` request, but only when
    /// [`PermissionRequest::is_in_worktree`] is true.
    pub safe_write_patterns_in_worktree: Vec<String>,
    /// Command prefixes (matched case-insensitively) that auto-approve a
    /// `shell` request.
    pub safe_commands: Vec<String>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self {
            safe_read_patterns: vec!["src/".to_string(), "tests/".to_string()],
            safe_write_patterns_in_worktree: vec!["src/".to_string(), "tests/".to_string()],
            safe_commands: vec![
                "git status".to_string(),
                "git diff".to_string(),
                "git log".to_string(),
                "cargo check".to_string(),
                "cargo test".to_string(),
                "ls".to_string(),
            ],
        }
    }
}

fn matches_any_prefix(target: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| target.starts_with(p.as_str()))
}

fn matches_any_prefix_ci(action: &str, patterns: &[String]) -> bool {
    let action_lower = action.to_lowercase();
    patterns
        .iter()
        .any(|p| action_lower.starts_with(&p.to_lowercase()))
}

/// Attempt to auto-approve `req` as the parent, without touching the
/// user or the owner's mailbox (spec §4.6 step 3).
///
/// Returns `Some(Decision::approve(..))` on an auto-approve match, or
/// `None` when the request must escalate -- either because it's
/// `isSensitive`, or because nothing matched ("Otherwise -> escalate").
pub fn handle_as_parent(req: &PermissionRequest, policy: &PermissionPolicy) -> Option<Decision> {
    if req.is_sensitive {
        return None;
    }

    let target = req.target.as_deref().unwrap_or("");

    match req.kind {
        PermissionKind::Read if matches_any_prefix(target, &policy.safe_read_patterns) => {
            Some(Decision::approve(DecidedBy::AutoPolicy, Some(Remember::Session)))
        }
        PermissionKind::Write
            if req.is_in_worktree()
                && matches_any_prefix(target, &policy.safe_write_patterns_in_worktree) =>
        {
            Some(Decision::approve(DecidedBy::AutoPolicy, Some(Remember::Session)))
        }
        PermissionKind::Shell if matches_any_prefix_ci(&req.action, &policy.safe_commands) => {
            Some(Decision::approve(DecidedBy::AutoPolicy, Some(Remember::Session)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::types::PermissionKind;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn req(kind: PermissionKind, target: &str, is_sensitive: bool, in_worktree: bool) -> PermissionRequest {
        let mut context = HashMap::new();
        if in_worktree {
            context.insert("isInWorktree".to_string(), "true".to_string());
        }
        PermissionRequest {
            id: Uuid::new_v4(),
            origin_worker_id: Uuid::new_v4(),
            origin_depth: 1,
            kind,
            action: target.to_string(),
            target: Some(target.to_string()),
            context,
            is_sensitive,
            timeout: std::time::Duration::from_secs(30),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn safe_read_auto_approves() {
        let policy = PermissionPolicy::default();
        let r = req(PermissionKind::Read, "src/foo.ts", false, false);
        let decision = handle_as_parent(&r, &policy).unwrap();
        assert!(decision.is_approved());
        assert_eq!(decision.remember, Some(Remember::Session));
    }

    #[test]
    fn write_outside_worktree_escalates() {
        let policy = PermissionPolicy::default();
        let r = req(PermissionKind::Write, "src/foo.ts", false, false);
        assert!(handle_as_parent(&r, &policy).is_none());
    }

    #[test]
    fn write_inside_worktree_auto_approves() {
        let policy = PermissionPolicy::default();
        let r = req(PermissionKind::Write, "src/foo.ts", false, true);
        assert!(handle_as_parent(&r, &policy).unwrap().is_approved());
    }

    #[test]
    fn shell_safe_command_case_insensitive() {
        let policy = PermissionPolicy::default();
        let r = req(PermissionKind::Shell, "GIT STATUS --short", false, false);
        assert!(handle_as_parent(&r, &policy).unwrap().is_approved());
    }

    #[test]
    fn sensitive_always_escalates() {
        let policy = PermissionPolicy::default();
        let r = req(PermissionKind::Read, "src/foo.ts", true, false);
        assert!(handle_as_parent(&r, &policy).is_none());
    }

    #[test]
    fn unmatched_shell_escalates() {
        let policy = PermissionPolicy::default();
        let r = req(PermissionKind::Shell, "rm -rf /tmp/x", false, false);
        assert!(handle_as_parent(&r, &policy).is_none());
    }
}
