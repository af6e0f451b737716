//! The `ApprovalStore` trait: the optional persistence hook spec §6 calls
//! out ("Persisted state... approval rules and audit log"). The
//! permission router (C6) runs fully in-process without one -- a host
//! that wants durability across restarts supplies an implementation
//! (see the `warden-store` crate) behind this trait; nothing else in the
//! core ever depends on it directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::permission::{DecidedBy, DecisionKind, PermissionKind};

/// A persisted auto-approval rule -- the durable counterpart of a
/// `Remember::Always` decision (spec §4.6 `remember`).
#[derive(Debug, Clone)]
pub struct ApprovalRule {
    pub id: Uuid,
    pub kind: PermissionKind,
    pub action: String,
    pub target: Option<String>,
    pub decision: DecisionKind,
    pub created_at: DateTime<Utc>,
}

/// One row of the audit log: a terminal decision the router reached,
/// regardless of whether it was remembered.
#[derive(Debug, Clone)]
pub struct ApprovalRecord {
    pub id: Uuid,
    pub origin_worker_id: Uuid,
    pub kind: PermissionKind,
    pub action: String,
    pub target: Option<String>,
    pub decision: DecisionKind,
    pub decided_by: DecidedBy,
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Persistence hook for approval rules and the audit log. Opaque to the
/// rest of the core: the router only ever calls these three methods and
/// never inspects how (or whether) they're backed by a real database.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Load every persisted rule, used to preload the router's session
    /// memo at startup so `Remember::Always` decisions survive a process
    /// restart (the in-process memo alone does not).
    async fn load_rules(&self) -> anyhow::Result<Vec<ApprovalRule>>;

    /// Persist a new `Remember::Always` rule.
    async fn save_rule(&self, rule: &ApprovalRule) -> anyhow::Result<()>;

    /// Append one audit-log row for a terminal decision.
    async fn record_decision(&self, record: &ApprovalRecord) -> anyhow::Result<()>;
}

// Compile-time assertion: ApprovalStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ApprovalStore) {}
};

/// No-op reference implementation: discards everything. The default when
/// no store is wired up -- matches spec §1's "state is in-process; a
/// persistence hook is allowed but not required".
#[derive(Debug, Clone, Default)]
pub struct NoopApprovalStore;

#[async_trait]
impl ApprovalStore for NoopApprovalStore {
    async fn load_rules(&self) -> anyhow::Result<Vec<ApprovalRule>> {
        Ok(Vec::new())
    }

    async fn save_rule(&self, _rule: &ApprovalRule) -> anyhow::Result<()> {
        Ok(())
    }

    async fn record_decision(&self, _record: &ApprovalRecord) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_store_discards_everything() {
        let store = NoopApprovalStore;
        assert!(store.load_rules().await.unwrap().is_empty());
        store
            .save_rule(&ApprovalRule {
                id: Uuid::new_v4(),
                kind: PermissionKind::Read,
                action: "read".to_string(),
                target: None,
                decision: DecisionKind::Approve,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }
}
