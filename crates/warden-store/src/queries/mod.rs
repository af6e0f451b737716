//! Query functions, one module per table, mirroring the teacher's
//! `gator-db::queries` layout.

mod approval_records;
mod approval_rules;

pub use approval_records::{insert_approval_record, list_records_for_worker};
pub use approval_rules::{insert_approval_rule, select_approval_rules};
