//! Collaborator interfaces: the seams this core delegates to rather than
//! implements itself.
//!
//! Agent transport, tool-server wiring, git/worktree mechanics, operator
//! notification, config loading, and telemetry products are all out of
//! scope for this core; each gets a minimal, object-safe trait here plus
//! a reference implementation used by tests and the CLI's default wiring.

mod agent_runner;
mod approval_store;
mod config_provider;
mod git_ops;
mod notifier;
mod telemetry;
mod tool_set;

pub use agent_runner::{
    AgentOutcome, AgentRunner, ErrorClass, NoopAgentRunner, ShellAgentRunner, TokenUsage,
};
pub use approval_store::{ApprovalRecord, ApprovalRule, ApprovalStore, NoopApprovalStore};
pub use config_provider::{ConfigProvider, EnvConfigProvider, StaticConfigProvider};
pub use git_ops::{GitOps, NoopGitOps};
pub use notifier::{LoggingNotifier, Notifier, NotifyLevel};
pub use telemetry::{NoopTelemetry, Telemetry};
pub use tool_set::{NoopToolSetFactory, ToolHandle, ToolSetFactory};
