//! `PgApprovalStore`: the PostgreSQL-backed implementation of
//! `warden_core::collaborators::ApprovalStore`.

use async_trait::async_trait;
use sqlx::PgPool;
use warden_core::collaborators::{ApprovalRecord, ApprovalRule, ApprovalStore};

use crate::models::{self, ApprovalRecordRow, ApprovalRuleRow};
use crate::queries;

/// Durable approval-rule/audit-log persistence over a `PgPool`. Cheap to
/// clone (the pool is itself a handle), so it can be wrapped in an `Arc`
/// and handed to `PermissionRouter::with_store` as-is.
#[derive(Debug, Clone)]
pub struct PgApprovalStore {
    pool: PgPool,
}

impl PgApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalStore for PgApprovalStore {
    async fn load_rules(&self) -> anyhow::Result<Vec<ApprovalRule>> {
        let rows = queries::select_approval_rules(&self.pool).await?;
        rows.into_iter().map(row_to_rule).collect()
    }

    async fn save_rule(&self, rule: &ApprovalRule) -> anyhow::Result<()> {
        let row = ApprovalRuleRow {
            id: rule.id,
            kind: models::encode_kind(&rule.kind),
            action: rule.action.clone(),
            target: rule.target.clone(),
            decision: models::encode_decision(&rule.decision).to_string(),
            created_at: rule.created_at,
        };
        queries::insert_approval_rule(&self.pool, &row).await
    }

    async fn record_decision(&self, record: &ApprovalRecord) -> anyhow::Result<()> {
        let row = ApprovalRecordRow {
            id: record.id,
            origin_worker_id: record.origin_worker_id,
            kind: models::encode_kind(&record.kind),
            action: record.action.clone(),
            target: record.target.clone(),
            decision: models::encode_decision(&record.decision).to_string(),
            decided_by: models::encode_decided_by(&record.decided_by).to_string(),
            reason: record.reason.clone(),
            decided_at: record.decided_at,
        };
        queries::insert_approval_record(&self.pool, &row).await
    }
}

fn row_to_rule(row: ApprovalRuleRow) -> anyhow::Result<ApprovalRule> {
    Ok(ApprovalRule {
        id: row.id,
        kind: models::decode_kind(&row.kind),
        action: row.action,
        target: row.target,
        decision: models::decode_decision(&row.decision)?,
        created_at: row.created_at,
    })
}
