//! The `AgentRunner` trait: the adapter interface for whatever actually
//! drives an LLM coding agent to completion for a subtask.
//!
//! This core does not speak to a model provider or a tool-call transport
//! itself (spec's "out of scope" list for this crate); it calls through
//! this trait and reacts to the outcome. Modeled on the teacher's
//! `Harness` trait: object-safe, `Send + Sync`, one `spawn`-equivalent
//! entry point per unit of work.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::identity::WorkerContext;
use crate::subtask::SubTask;

/// Coarse classification of a failed run, used to populate
/// `Update::Error::error_type` when the runner can tell us (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimit,
    Network,
    Auth,
    Fatal,
    Unknown,
}

/// Token usage for a single run, as reported by the collaborator's
/// `metadata.usage` (spec §6 "Agent runner" contract:
/// `metadata{usage{input,output,total}, model}`). `total` is carried
/// separately rather than derived, since some runners report a total
/// that includes tokens (e.g. cached reads) not broken out into
/// `input`/`output`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// The terminal outcome of running a subtask to completion. Both
/// variants carry usage/model metadata -- a failed run can still have
/// burned billable tokens before it errored out (spec §4.1 "Cost
/// ledger" has no carve-out for failed runs).
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    Completed {
        result: String,
        usage: TokenUsage,
        model: String,
    },
    Failed {
        error: String,
        class: ErrorClass,
        usage: TokenUsage,
        model: String,
    },
}

/// Adapter interface for running a single subtask's agent to completion.
///
/// Implementors own whatever process/transport/tool-call loop actually
/// talks to the model; this trait only cares about the final outcome and
/// cooperative cancellation.
///
/// # Object safety
///
/// Every method returns a concrete or boxed type, so `Box<dyn AgentRunner>`
/// and `Arc<dyn AgentRunner>` both work.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run `subtask` to completion inside `worker_context`'s worktree,
    /// observing `cancel` for cooperative termination (spec §4.3,
    /// "Cancellation").
    async fn run(
        &self,
        subtask: &SubTask,
        worker_context: &WorkerContext,
        cancel: CancellationToken,
    ) -> AgentOutcome;
}

// Compile-time assertion: AgentRunner must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn AgentRunner) {}
};

/// A runner that completes immediately with a fixed outcome. Used by
/// tests and as a default when no real agent transport is wired up.
pub struct NoopAgentRunner {
    outcome: AgentOutcome,
}

impl NoopAgentRunner {
    pub fn completing_with(result: impl Into<String>) -> Self {
        Self {
            outcome: AgentOutcome::Completed {
                result: result.into(),
                usage: TokenUsage::default(),
                model: "default".to_string(),
            },
        }
    }

    pub fn completing_with_usage(result: impl Into<String>, usage: TokenUsage, model: impl Into<String>) -> Self {
        Self {
            outcome: AgentOutcome::Completed {
                result: result.into(),
                usage,
                model: model.into(),
            },
        }
    }

    pub fn failing_with(error: impl Into<String>, class: ErrorClass) -> Self {
        Self {
            outcome: AgentOutcome::Failed {
                error: error.into(),
                class,
                usage: TokenUsage::default(),
                model: "default".to_string(),
            },
        }
    }
}

#[async_trait]
impl AgentRunner for NoopAgentRunner {
    async fn run(
        &self,
        _subtask: &SubTask,
        _worker_context: &WorkerContext,
        _cancel: CancellationToken,
    ) -> AgentOutcome {
        self.outcome.clone()
    }
}

/// An `AgentRunner` that shells out to a configurable command template,
/// feeds the subtask prompt on stdin, and classifies the process exit
/// into an [`AgentOutcome`]. Modeled directly on the teacher's
/// `Harness::spawn`/`events`/`kill`/`is_running` sequence, collapsed into
/// a single call since this trait has no streaming-events method.
///
/// `command_template` is split on whitespace; the literal token `{agent_type}`
/// is substituted with the subtask's `agent_type` before spawning, e.g.
/// `"claude --agent {agent_type} -p"`.
pub struct ShellAgentRunner {
    command_template: String,
}

impl ShellAgentRunner {
    pub fn new(command_template: impl Into<String>) -> Self {
        Self {
            command_template: command_template.into(),
        }
    }
}

#[async_trait]
impl AgentRunner for ShellAgentRunner {
    async fn run(
        &self,
        subtask: &SubTask,
        worker_context: &WorkerContext,
        cancel: CancellationToken,
    ) -> AgentOutcome {
        use tokio::io::AsyncWriteExt;

        let mut parts = self
            .command_template
            .split_whitespace()
            .map(|tok| tok.replace("{agent_type}", &subtask.agent_type));
        let Some(program) = parts.next() else {
            return AgentOutcome::Failed {
                error: "empty agent command template".to_string(),
                class: ErrorClass::Fatal,
                usage: TokenUsage::default(),
                model: subtask.agent_type.clone(),
            };
        };
        let args: Vec<String> = parts.collect();

        let mut child = match tokio::process::Command::new(&program)
            .args(&args)
            .current_dir(&worker_context.worktree_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return AgentOutcome::Failed {
                    error: format!("failed to spawn agent process: {e}"),
                    class: ErrorClass::Fatal,
                    usage: TokenUsage::default(),
                    model: subtask.agent_type.clone(),
                };
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(subtask.prompt.as_bytes()).await;
            drop(stdin);
        }

        // The shell protocol has no side channel for token usage; a
        // runner that talks to a real billed transport must report real
        // numbers here instead of the default zero usage.
        tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => AgentOutcome::Completed {
                    result: format!("agent exited successfully ({status})"),
                    usage: TokenUsage::default(),
                    model: subtask.agent_type.clone(),
                },
                Ok(status) => AgentOutcome::Failed {
                    error: format!("agent exited with {status}"),
                    class: ErrorClass::Unknown,
                    usage: TokenUsage::default(),
                    model: subtask.agent_type.clone(),
                },
                Err(e) => AgentOutcome::Failed {
                    error: format!("failed to wait on agent process: {e}"),
                    class: ErrorClass::Fatal,
                    usage: TokenUsage::default(),
                    model: subtask.agent_type.clone(),
                },
            },
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                AgentOutcome::Failed {
                    error: "cancelled".to_string(),
                    class: ErrorClass::Fatal,
                    usage: TokenUsage::default(),
                    model: subtask.agent_type.clone(),
                }
            }
        }
    }
}
