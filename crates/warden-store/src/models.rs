//! Row types for the `approval_rules` and `approval_records` tables, plus
//! the encode/decode glue between them and `warden_core`'s in-process
//! types. `warden-core`'s `PermissionKind`/`DecisionKind`/`DecidedBy`
//! don't carry `sqlx`/`serde` impls of their own (the core has no
//! dependency on either) -- ported to this crate's boundary, the way the
//! teacher keeps wire/storage codecs out of `gator-core` entirely and
//! confined to `gator-db::models`.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;
use warden_core::permission::{DecidedBy, DecisionKind, PermissionKind};

/// Row shape of `approval_rules`.
#[derive(Debug, Clone, FromRow)]
pub struct ApprovalRuleRow {
    pub id: Uuid,
    pub kind: String,
    pub action: String,
    pub target: Option<String>,
    pub decision: String,
    pub created_at: DateTime<Utc>,
}

/// Row shape of `approval_records`.
#[derive(Debug, Clone, FromRow)]
pub struct ApprovalRecordRow {
    pub id: Uuid,
    pub origin_worker_id: Uuid,
    pub kind: String,
    pub action: String,
    pub target: Option<String>,
    pub decision: String,
    pub decided_by: String,
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}

pub fn encode_kind(kind: &PermissionKind) -> String {
    kind.to_string()
}

pub fn decode_kind(s: &str) -> PermissionKind {
    match s {
        "read" => PermissionKind::Read,
        "write" => PermissionKind::Write,
        "shell" => PermissionKind::Shell,
        "mcp" => PermissionKind::Mcp,
        other => PermissionKind::Other(other.to_string()),
    }
}

pub fn encode_decision(decision: &DecisionKind) -> &'static str {
    match decision {
        DecisionKind::Approve => "approve",
        DecisionKind::Deny => "deny",
    }
}

pub fn decode_decision(s: &str) -> anyhow::Result<DecisionKind> {
    match s {
        "approve" => Ok(DecisionKind::Approve),
        "deny" => Ok(DecisionKind::Deny),
        other => anyhow::bail!("invalid decision kind in store: {other:?}"),
    }
}

pub fn encode_decided_by(decided_by: &DecidedBy) -> &'static str {
    match decided_by {
        DecidedBy::Memo => "memo",
        DecidedBy::AutoPolicy => "auto_policy",
        DecidedBy::Parent => "parent",
        DecidedBy::User => "user",
        DecidedBy::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips() {
        for kind in [
            PermissionKind::Read,
            PermissionKind::Write,
            PermissionKind::Shell,
            PermissionKind::Mcp,
            PermissionKind::Other("custom".to_string()),
        ] {
            let encoded = encode_kind(&kind);
            assert_eq!(decode_kind(&encoded), kind);
        }
    }

    #[test]
    fn decision_round_trips() {
        for decision in [DecisionKind::Approve, DecisionKind::Deny] {
            let encoded = encode_decision(&decision);
            assert_eq!(decode_decision(encoded).unwrap(), decision);
        }
    }

    #[test]
    fn decode_decision_rejects_garbage() {
        assert!(decode_decision("maybe").is_err());
    }
}
