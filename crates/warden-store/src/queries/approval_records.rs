//! Query functions for the `approval_records` table (the audit log).

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ApprovalRecordRow;

/// Append one audit record. No `ON CONFLICT` clause: a duplicate id here
/// would indicate a bug upstream (the router mints a fresh `Uuid::new_v4`
/// per decision) and should surface as an error rather than be silently
/// swallowed.
pub async fn insert_approval_record(pool: &PgPool, row: &ApprovalRecordRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO approval_records \
         (id, origin_worker_id, kind, action, target, decision, decided_by, reason, decided_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(row.id)
    .bind(row.origin_worker_id)
    .bind(&row.kind)
    .bind(&row.action)
    .bind(&row.target)
    .bind(&row.decision)
    .bind(&row.decided_by)
    .bind(&row.reason)
    .bind(row.decided_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert approval record {}", row.id))?;

    Ok(())
}

/// List audit records for a given origin worker, most recent first. Used
/// by the CLI's `audit` inspection command.
pub async fn list_records_for_worker(
    pool: &PgPool,
    origin_worker_id: Uuid,
) -> Result<Vec<ApprovalRecordRow>> {
    let rows = sqlx::query_as::<_, ApprovalRecordRow>(
        "SELECT * FROM approval_records \
         WHERE origin_worker_id = $1 \
         ORDER BY decided_at DESC",
    )
    .bind(origin_worker_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list approval records for worker {origin_worker_id}"))?;

    Ok(rows)
}
