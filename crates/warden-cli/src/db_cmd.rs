//! `warden store migrate` command: create and migrate the optional
//! approval-rule/audit-log database (spec §6 "Persisted state").
//!
//! Ported from `gator db-init`; trimmed to the one schema `warden-store`
//! owns. Nothing else in this CLI requires a database -- plans, tasks,
//! and subtasks are in-process only (spec §1 Non-goals).

use anyhow::{Context, Result};
use warden_store::StoreConfig;

pub async fn run(store_config: &StoreConfig) -> Result<()> {
    println!("Initializing warden approval store at {}...", store_config.database_url);

    warden_store::pool::ensure_database_exists(store_config).await?;
    let pool = warden_store::pool::create_pool(store_config).await?;
    let migrations_path = warden_store::pool::default_migrations_path();
    warden_store::pool::run_migrations(&pool, migrations_path)
        .await
        .context("failed to run migrations")?;

    let counts = warden_store::pool::table_counts(&pool).await?;
    println!("Store ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    pool.close().await;
    println!("warden store migrate complete.");
    Ok(())
}
