//! Hierarchical permission router (spec §4.6, C6).
//!
//! Routes a sensitive-operation request up the parent chain: session
//! memoisation, then a pure parent auto-approval policy, then escalation
//! to the owning worker's mailbox (with a timeout), and finally to the
//! human operator via [`crate::collaborators::Notifier`].

mod policy;
mod types;

pub use policy::{handle_as_parent, PermissionPolicy};
pub use types::{
    DecidedBy, Decision, DecisionKind, PermissionKind, PermissionRequest, Remember, WireMessage,
};

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collaborators::{ApprovalRecord, ApprovalRule, ApprovalStore, NotifyLevel, Notifier};
use crate::config::{PermissionLevel, WardenConfig};
use crate::identity::WorkerContext;

/// What the owning worker decided about an escalated request, distinct
/// from the router's terminal [`Decision`] because `Escalate` still has
/// to fall through to the user (spec §4.6 step 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerVerdict {
    Approve { remember: Option<Remember> },
    Deny { reason: String },
    Escalate,
}

type MemoKey = (PermissionKind, String, Option<String>);

fn matches_ci_prefix(action_lower: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| action_lower.starts_with(&p.to_lowercase()))
}

/// `*.ext` patterns match as a suffix; anything else matches as a
/// substring (covers bare patterns like `.env` or `.git/`).
fn matches_file_pattern(target: &str, pattern: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => target.ends_with(suffix),
        None => target.contains(pattern),
    }
}

/// The permission router.
pub struct PermissionRouter {
    policy: PermissionPolicy,
    /// Resolved `WardenConfig` (spec §6 "Config" collaborator): absolute
    /// deny patterns and `permission_level` are consulted before the
    /// `policy` auto-approval defaults ever run.
    config: WardenConfig,
    memo: Mutex<HashMap<MemoKey, Decision>>,
    /// owner_worker_id -> queue of pending permission-request wire messages.
    mailboxes: Mutex<HashMap<Uuid, VecDeque<WireMessage>>>,
    /// permission_request_id -> channel the waiting `route_permission`
    /// call is blocked on.
    pending: Mutex<HashMap<Uuid, oneshot::Sender<OwnerVerdict>>>,
    /// Optional durability hook (spec §6); `None` runs fully in-process.
    store: Option<std::sync::Arc<dyn ApprovalStore>>,
}

impl PermissionRouter {
    /// Build a router with the default `WardenConfig`. Prefer
    /// [`PermissionRouter::with_config`] when a resolved config is
    /// available (e.g. from `warden-cli`'s config loader).
    pub fn new(policy: PermissionPolicy) -> Self {
        Self::with_config(policy, WardenConfig::default())
    }

    /// Build a router that also consults a resolved [`WardenConfig`]:
    /// `file_deny_patterns`/`terminal_deny_patterns`/
    /// `allow_outside_workspace` are checked before `policy`'s
    /// auto-approval defaults, and `permission_level` gates whether
    /// auto-approval runs at all (spec §4.6, §6).
    pub fn with_config(policy: PermissionPolicy, config: WardenConfig) -> Self {
        Self {
            policy,
            config,
            memo: Mutex::new(HashMap::new()),
            mailboxes: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Build a router backed by an [`ApprovalStore`]: `Remember::Always`
    /// decisions are persisted as rules, and every terminal decision is
    /// appended to the audit log. Call [`PermissionRouter::preload`]
    /// after construction to seed the session memo from prior rules.
    pub fn with_store(policy: PermissionPolicy, store: std::sync::Arc<dyn ApprovalStore>) -> Self {
        Self::with_store_and_config(policy, WardenConfig::default(), store)
    }

    /// [`PermissionRouter::with_store`] plus a resolved [`WardenConfig`].
    pub fn with_store_and_config(
        policy: PermissionPolicy,
        config: WardenConfig,
        store: std::sync::Arc<dyn ApprovalStore>,
    ) -> Self {
        Self {
            policy,
            config,
            memo: Mutex::new(HashMap::new()),
            mailboxes: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            store: Some(store),
        }
    }

    /// Seed the session memo from persisted rules. No-op if no store is
    /// wired up. Failures are logged, not propagated -- a cold or
    /// unreachable store must not block router construction (spec §1
    /// "state is in-process; a persistence hook is allowed but not
    /// required").
    pub async fn preload(&self) {
        let Some(store) = &self.store else { return };
        match store.load_rules().await {
            Ok(rules) => {
                let mut memo = self.memo.lock().unwrap();
                for rule in rules {
                    let decision = Decision {
                        decision: rule.decision,
                        decided_by: DecidedBy::Memo,
                        reason: None,
                        remember: Some(Remember::Always),
                    };
                    memo.insert((rule.kind, rule.action, rule.target), decision);
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to preload approval rules"),
        }
    }

    /// Route a permission request to a final, terminal decision (spec
    /// §4.6).
    pub async fn route_permission(
        &self,
        req: PermissionRequest,
        worker_context: &WorkerContext,
        notifier: &dyn Notifier,
        cancel: CancellationToken,
    ) -> Decision {
        // Step 1: session memoisation.
        let key = req.memo_key();
        if let Some(decision) = self.memo.lock().unwrap().get(&key).cloned() {
            return decision;
        }

        if cancel.is_cancelled() {
            let decision = Decision::deny(DecidedBy::Cancelled, "cancelled");
            self.finalize(&req, &key, &decision);
            return decision;
        }

        // Step 2b: config-level absolute deny/allow (spec §6 "Config"):
        // `file_deny_patterns`/`terminal_deny_patterns` and
        // `allow_outside_workspace` take priority over any owner or auto
        // approval logic, and apply even when there's no owner to
        // escalate to.
        if let Some(decision) = self.check_config(&req) {
            self.finalize(&req, &key, &decision);
            return decision;
        }

        // Step 2: no owner -> straight to the user.
        let Some(owner) = worker_context.owner.clone() else {
            return self.escalate_to_user(&req, notifier, &key).await;
        };

        // Step 3: pure parent auto-approval, gated by `permission_level`
        // (`Strict` never auto-approves; `Permissive` approves anything
        // that wasn't already denied by `check_config` above).
        if self.config.permission_level != PermissionLevel::Strict {
            if let Some(decision) = handle_as_parent(&req, &self.policy) {
                self.finalize(&req, &key, &decision);
                return decision;
            }
        }
        if self.config.permission_level == PermissionLevel::Permissive {
            let decision = Decision::approve(DecidedBy::AutoPolicy, Some(Remember::Session));
            self.finalize(&req, &key, &decision);
            return decision;
        }

        // Step 4: enqueue to the owner's mailbox and wait for a response,
        // bounded by `req.timeout` and cooperative cancellation.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(req.id, tx);
        self.mailboxes
            .lock()
            .unwrap()
            .entry(owner.owner_id)
            .or_default()
            .push_back(WireMessage::PermissionRequest {
                permission_request_id: req.id,
                kind: req.kind.clone(),
                action: req.action.clone(),
                target: req.target.clone(),
                context: req.context.clone(),
                is_sensitive: req.is_sensitive,
                origin_worker_id: req.origin_worker_id,
                origin_depth: req.origin_depth,
            });

        let verdict = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.pending.lock().unwrap().remove(&req.id);
                let decision = Decision::deny(DecidedBy::Cancelled, "cancelled");
                self.finalize(&req, &key, &decision);
                return decision;
            }
            result = tokio::time::timeout(req.timeout, rx) => {
                self.pending.lock().unwrap().remove(&req.id);
                match result {
                    Ok(Ok(v)) => v,
                    Ok(Err(_)) | Err(_) => OwnerVerdict::Escalate,
                }
            }
        };

        match verdict {
            OwnerVerdict::Approve { remember } => {
                let decision = Decision::approve(DecidedBy::Parent, remember);
                self.finalize(&req, &key, &decision);
                decision
            }
            OwnerVerdict::Deny { reason } => {
                let decision = Decision::deny(DecidedBy::Parent, reason);
                self.finalize(&req, &key, &decision);
                decision
            }
            // Step 5: owner escalation also falls through to the user.
            OwnerVerdict::Escalate => self.escalate_to_user(&req, notifier, &key).await,
        }
    }

    /// Config-level absolute deny/allow, checked ahead of any owner chain
    /// (spec §6 "Config" collaborator). Returns `Some` only on a terminal
    /// decision; `None` means the request falls through to the normal
    /// owner-routing steps.
    fn check_config(&self, req: &PermissionRequest) -> Option<Decision> {
        if req.kind == PermissionKind::Shell {
            let action_lower = req.action.to_lowercase();
            if matches_ci_prefix(&action_lower, &self.config.terminal_allow_patterns) {
                return Some(Decision::approve(DecidedBy::AutoPolicy, Some(Remember::Session)));
            }
            if matches_ci_prefix(&action_lower, &self.config.terminal_deny_patterns) {
                return Some(Decision::deny(
                    DecidedBy::AutoPolicy,
                    format!("command `{}` matches a denied terminal pattern", req.action),
                ));
            }
        }

        if matches!(req.kind, PermissionKind::Read | PermissionKind::Write) {
            if let Some(target) = &req.target {
                if self
                    .config
                    .file_deny_patterns
                    .iter()
                    .any(|pattern| matches_file_pattern(target, pattern))
                {
                    return Some(Decision::deny(
                        DecidedBy::AutoPolicy,
                        format!("target `{target}` matches a denied file pattern"),
                    ));
                }
            }
        }

        if req.kind == PermissionKind::Write
            && !req.is_in_worktree()
            && !self.config.allow_outside_workspace
        {
            return Some(Decision::deny(
                DecidedBy::AutoPolicy,
                "write targets outside the worktree are disallowed by config",
            ));
        }

        None
    }

    async fn escalate_to_user(
        &self,
        req: &PermissionRequest,
        notifier: &dyn Notifier,
        key: &MemoKey,
    ) -> Decision {
        let message = format!(
            "approve {} on {}{}?",
            req.kind,
            req.action,
            req.target
                .as_ref()
                .map(|t| format!(" ({t})"))
                .unwrap_or_default()
        );
        let response = notifier.notify(NotifyLevel::Warn, &message).await;
        let approved = matches!(response.as_deref(), Some("approve") | Some("yes"));
        let decision = if approved {
            Decision::approve(DecidedBy::User, Some(Remember::Session))
        } else {
            Decision::deny(DecidedBy::User, "denied by user")
        };
        self.finalize(req, key, &decision);
        decision
    }

    /// Apply a terminal [`Decision`]: memoise it locally when requested,
    /// and -- if a store is wired up -- persist the audit record (every
    /// terminal decision) and upgrade `Remember::Always` decisions into a
    /// durable rule. Persistence runs fire-and-forget on a background
    /// task so a slow or unreachable store never blocks the caller that's
    /// waiting on this decision.
    fn finalize(&self, req: &PermissionRequest, key: &MemoKey, decision: &Decision) {
        if matches!(decision.remember, Some(Remember::Session) | Some(Remember::Always)) {
            self.memo.lock().unwrap().insert(key.clone(), decision.clone());
        }

        let Some(store) = self.store.clone() else { return };
        let record = ApprovalRecord {
            id: Uuid::new_v4(),
            origin_worker_id: req.origin_worker_id,
            kind: req.kind.clone(),
            action: req.action.clone(),
            target: req.target.clone(),
            decision: decision.decision.clone(),
            decided_by: decision.decided_by.clone(),
            reason: decision.reason.clone(),
            decided_at: chrono::Utc::now(),
        };
        let rule = matches!(decision.remember, Some(Remember::Always)).then(|| ApprovalRule {
            id: Uuid::new_v4(),
            kind: req.kind.clone(),
            action: req.action.clone(),
            target: req.target.clone(),
            decision: decision.decision.clone(),
            created_at: chrono::Utc::now(),
        });
        tokio::spawn(async move {
            if let Err(err) = store.record_decision(&record).await {
                tracing::warn!(error = %err, "failed to persist approval audit record");
            }
            if let Some(rule) = rule {
                if let Err(err) = store.save_rule(&rule).await {
                    tracing::warn!(error = %err, "failed to persist approval rule");
                }
            }
        });
    }

    /// Drain the pending permission requests addressed to `owner_id`, so
    /// the owning worker can present them to its agent loop (spec §4.6
    /// step 4; mirrors [`crate::monitor::UpdateBus::consume_updates`]).
    pub fn poll_requests(&self, owner_id: Uuid) -> Vec<WireMessage> {
        match self.mailboxes.lock().unwrap().get_mut(&owner_id) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// The owning worker's verdict on a previously-polled permission
    /// request. No-op (logged) if no `route_permission` call is still
    /// waiting on this id -- it may have already timed out.
    pub fn submit_owner_verdict(&self, permission_request_id: Uuid, verdict: OwnerVerdict) {
        if let Some(tx) = self.pending.lock().unwrap().remove(&permission_request_id) {
            let _ = tx.send(verdict);
        } else {
            tracing::warn!(
                permission_request_id = %permission_request_id,
                "owner verdict submitted for a permission request that is no longer pending"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::LoggingNotifier;
    use crate::identity::{Owner, OwnerType, SpawnContext, WorkerContext};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn request(kind: PermissionKind, target: &str, is_sensitive: bool) -> PermissionRequest {
        PermissionRequest {
            id: Uuid::new_v4(),
            origin_worker_id: Uuid::new_v4(),
            origin_depth: 1,
            kind,
            action: target.to_string(),
            target: Some(target.to_string()),
            context: HashMap::new(),
            is_sensitive,
            timeout: Duration::from_millis(200),
            created_at: chrono::Utc::now(),
        }
    }

    fn worker_with_owner() -> WorkerContext {
        WorkerContext::new(
            Uuid::new_v4(),
            None,
            None,
            PathBuf::from("/tmp"),
            1,
            SpawnContext::Orchestrator,
            Some(Owner {
                owner_id: Uuid::new_v4(),
                owner_type: OwnerType::Worker,
            }),
        )
    }

    #[tokio::test]
    async fn no_owner_escalates_straight_to_user() {
        let router = PermissionRouter::new(PermissionPolicy::default());
        let worker = WorkerContext::new(
            Uuid::new_v4(),
            None,
            None,
            PathBuf::from("/tmp"),
            0,
            SpawnContext::Agent,
            None,
        );
        let req = request(PermissionKind::Shell, "custom-tool --run", false);
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        // LoggingNotifier never returns a response, so this denies.
        assert!(!decision.is_approved());
    }

    #[tokio::test]
    async fn auto_approve_skips_owner_mailbox() {
        let router = PermissionRouter::new(PermissionPolicy::default());
        let worker = worker_with_owner();
        let req = request(PermissionKind::Read, "src/foo.ts", false);
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        assert!(decision.is_approved());
        assert!(router.poll_requests(worker.owner.unwrap().owner_id).is_empty());
    }

    #[tokio::test]
    async fn repeated_request_uses_memo() {
        let router = PermissionRouter::new(PermissionPolicy::default());
        let worker = worker_with_owner();
        let req1 = request(PermissionKind::Read, "src/foo.ts", false);
        let req2 = request(PermissionKind::Read, "src/foo.ts", false);
        let d1 = router
            .route_permission(req1, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        assert!(d1.is_approved());
        // Second request with the same key is answered from the memo
        // without needing to touch the mailbox.
        let d2 = router
            .route_permission(req2, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        assert!(d2.is_approved());
    }

    #[tokio::test]
    async fn owner_approval_resolves_escalated_request() {
        let router = std::sync::Arc::new(PermissionRouter::with_config(
            PermissionPolicy::default(),
            WardenConfig {
                allow_outside_workspace: true,
                ..WardenConfig::default()
            },
        ));
        let worker = worker_with_owner();
        let owner_id = worker.owner.as_ref().unwrap().owner_id;
        let req = request(PermissionKind::Write, "outside/file.ts", false);
        let req_id = req.id;

        let router_clone = std::sync::Arc::clone(&router);
        let responder = tokio::spawn(async move {
            // Poll until the request shows up in the mailbox.
            loop {
                let msgs = router_clone.poll_requests(owner_id);
                if !msgs.is_empty() {
                    router_clone.submit_owner_verdict(
                        req_id,
                        OwnerVerdict::Approve { remember: None },
                    );
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        responder.await.unwrap();
        assert!(decision.is_approved());
    }

    #[tokio::test]
    async fn timeout_escalates_to_user() {
        let router = PermissionRouter::with_config(
            PermissionPolicy::default(),
            WardenConfig {
                allow_outside_workspace: true,
                ..WardenConfig::default()
            },
        );
        let worker = worker_with_owner();
        let req = request(PermissionKind::Write, "outside/file.ts", false);
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        // Never answered by the owner -> times out -> escalates to user ->
        // LoggingNotifier denies.
        assert!(!decision.is_approved());
    }

    #[tokio::test]
    async fn write_outside_workspace_denied_before_owner_escalation() {
        let router = PermissionRouter::new(PermissionPolicy::default());
        let worker = worker_with_owner();
        let req = request(PermissionKind::Write, "outside/file.ts", false);
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        assert!(!decision.is_approved());
        assert_eq!(decision.decided_by, DecidedBy::AutoPolicy);
        // Denied by config before ever reaching the owner's mailbox.
        assert!(router.poll_requests(worker.owner.unwrap().owner_id).is_empty());
    }

    #[tokio::test]
    async fn file_deny_pattern_blocks_read_even_without_owner() {
        let router = PermissionRouter::new(PermissionPolicy::default());
        let worker = WorkerContext::new(
            Uuid::new_v4(),
            None,
            None,
            PathBuf::from("/tmp"),
            0,
            SpawnContext::Agent,
            None,
        );
        let req = request(PermissionKind::Read, "repo/.env", false);
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        assert!(!decision.is_approved());
        assert_eq!(decision.decided_by, DecidedBy::AutoPolicy);
    }

    #[tokio::test]
    async fn terminal_deny_pattern_beats_safe_command_prefix() {
        let router = PermissionRouter::with_config(
            PermissionPolicy::default(),
            WardenConfig {
                terminal_deny_patterns: vec!["git log --all".to_string()],
                ..WardenConfig::default()
            },
        );
        let worker = worker_with_owner();
        let req = request(PermissionKind::Shell, "git log --all --source", false);
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        assert!(!decision.is_approved());
    }

    #[tokio::test]
    async fn strict_permission_level_never_auto_approves() {
        let router = PermissionRouter::with_config(
            PermissionPolicy::default(),
            WardenConfig {
                permission_level: PermissionLevel::Strict,
                ..WardenConfig::default()
            },
        );
        let worker = worker_with_owner();
        let req = request(PermissionKind::Read, "src/foo.ts", false);
        // Owner never answers within the (default) timeout and
        // `LoggingNotifier` denies, but the point under test is that
        // `handle_as_parent`'s match on `src/` never gets a chance to run.
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        assert_ne!(decision.decided_by, DecidedBy::AutoPolicy);
    }

    #[tokio::test]
    async fn permissive_permission_level_approves_unmatched_requests() {
        let router = PermissionRouter::with_config(
            PermissionPolicy::default(),
            WardenConfig {
                permission_level: PermissionLevel::Permissive,
                ..WardenConfig::default()
            },
        );
        let worker = worker_with_owner();
        // Doesn't match any `safe_read_patterns`, but isn't denied either.
        let req = request(PermissionKind::Read, "docs/readme.md", false);
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        assert!(decision.is_approved());
        assert!(router.poll_requests(worker.owner.unwrap().owner_id).is_empty());
    }

    #[tokio::test]
    async fn cancellation_denies_with_reason() {
        let router = PermissionRouter::new(PermissionPolicy::default());
        let worker = worker_with_owner();
        let req = request(PermissionKind::Write, "outside/file.ts", false);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, cancel)
            .await;
        assert!(!decision.is_approved());
        assert_eq!(decision.reason.as_deref(), Some("cancelled"));
    }

    #[derive(Default)]
    struct RecordingStore {
        rules: Mutex<Vec<crate::collaborators::ApprovalRule>>,
        records: Mutex<Vec<crate::collaborators::ApprovalRecord>>,
    }

    #[async_trait::async_trait]
    impl crate::collaborators::ApprovalStore for RecordingStore {
        async fn load_rules(&self) -> anyhow::Result<Vec<crate::collaborators::ApprovalRule>> {
            Ok(self.rules.lock().unwrap().clone())
        }
        async fn save_rule(&self, rule: &crate::collaborators::ApprovalRule) -> anyhow::Result<()> {
            self.rules.lock().unwrap().push(rule.clone());
            Ok(())
        }
        async fn record_decision(&self, record: &crate::collaborators::ApprovalRecord) -> anyhow::Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn auto_approve_audit_record_persists_without_blocking() {
        let store = std::sync::Arc::new(RecordingStore::default());
        let router = PermissionRouter::with_store(PermissionPolicy::default(), store.clone());
        let worker = worker_with_owner();
        let req = request(PermissionKind::Read, "src/foo.ts", false);
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        assert!(decision.is_approved());
        // Persistence is fire-and-forget; give the spawned task a turn.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(store.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn preload_seeds_memo_from_persisted_rules() {
        let store = std::sync::Arc::new(RecordingStore::default());
        let target = "outside/approved.ts".to_string();
        store.rules.lock().unwrap().push(crate::collaborators::ApprovalRule {
            id: Uuid::new_v4(),
            kind: PermissionKind::Write,
            action: target.clone(),
            target: Some(target.clone()),
            decision: DecisionKind::Approve,
            created_at: chrono::Utc::now(),
        });
        let router = PermissionRouter::with_store(PermissionPolicy::default(), store);
        router.preload().await;

        let worker = worker_with_owner();
        let req = request(PermissionKind::Write, &target, false);
        // No owner mailbox activity needed: the memo hit short-circuits
        // before step 2.
        let decision = router
            .route_permission(req, &worker, &LoggingNotifier, CancellationToken::new())
            .await;
        assert!(decision.is_approved());
        assert_eq!(decision.decided_by, DecidedBy::Memo);
    }
}
