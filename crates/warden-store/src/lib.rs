//! Optional PostgreSQL-backed persistence for the permission router's
//! approval rules and audit log (spec §6 "Persisted state").
//!
//! Nothing in `warden-core` depends on this crate. A host wires it in by
//! constructing a [`PgApprovalStore`] and handing it to
//! `PermissionRouter::with_store` as an `Arc<dyn ApprovalStore>`; without
//! that wiring the router runs entirely in memory, as it always has.

mod config;
mod models;
pub mod pool;
mod queries;
mod store;

pub use config::StoreConfig;
pub use models::{ApprovalRecordRow, ApprovalRuleRow};
pub use store::PgApprovalStore;
