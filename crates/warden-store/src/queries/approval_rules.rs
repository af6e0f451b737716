//! Query functions for the `approval_rules` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::ApprovalRuleRow;

/// Insert a new approval rule row. `ON CONFLICT DO NOTHING` on `id` makes
/// this safe to retry: the router generates a fresh id per call so
/// collisions only happen on an actual retry of the same insert.
pub async fn insert_approval_rule(pool: &PgPool, row: &ApprovalRuleRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO approval_rules (id, kind, action, target, decision, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(row.id)
    .bind(&row.kind)
    .bind(&row.action)
    .bind(&row.target)
    .bind(&row.decision)
    .bind(row.created_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert approval rule {}", row.id))?;

    Ok(())
}

/// Load every persisted approval rule, oldest first, so that later
/// inserts win when the router folds them into its in-memory map.
pub async fn select_approval_rules(pool: &PgPool) -> Result<Vec<ApprovalRuleRow>> {
    let rows = sqlx::query_as::<_, ApprovalRuleRow>(
        "SELECT * FROM approval_rules ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to select approval rules")?;

    Ok(rows)
}
