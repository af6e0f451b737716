mod agents_cmd;
mod config;
mod db_cmd;
mod init_cmd;
mod notify;
mod plan_cmds;
mod plan_file;
mod spawn_cmd;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use config::WardenCliConfig;

#[derive(Parser)]
#[command(name = "warden", about = "Multi-agent orchestration core for a coding assistant")]
struct Cli {
    /// Approval-rule/audit-log database URL (overrides WARDEN_STORE_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a warden config file (no database required)
    Init {
        /// Approval-rule/audit-log database URL (omit to run without persistence)
        #[arg(long)]
        db_url: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Spawn a single subtask outside of any plan
    Spawn {
        /// Agent type to invoke (e.g. specialist id or "general")
        agent_type: String,
        /// Prompt/instructions for the agent
        prompt: String,
        /// Expected output description
        #[arg(long, default_value = "a completed change")]
        expected_output: String,
        /// Worktree directory the agent should operate in
        #[arg(long, default_value = ".")]
        worktree: PathBuf,
        /// Base branch the worktree was cut from, if any
        #[arg(long)]
        base_branch: Option<String>,
        /// Shell command to run as the agent (omit to simulate completion)
        #[arg(long)]
        agent_command: Option<String>,
        /// Validate and print without actually invoking an agent
        #[arg(long)]
        dry_run: bool,
    },
    /// Agent discovery
    Agents {
        #[command(subcommand)]
        command: AgentsCommands,
    },
    /// Approval-rule/audit-log store management
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Parse a plan TOML file and print its resolved task graph without running it
    Validate {
        /// Path to the plan TOML file
        file: PathBuf,
    },
    /// Run a plan TOML file to completion
    Run {
        /// Path to the plan TOML file
        file: PathBuf,
        /// Maximum number of concurrent agents
        #[arg(long, default_value_t = 4)]
        max_agents: usize,
        /// Timeout per task in seconds
        #[arg(long, default_value_t = 1800)]
        timeout: u64,
        /// Maximum retries per task
        #[arg(long, default_value_t = 2)]
        max_retries: u32,
        /// Shell command to run as the agent for every task (omit to simulate completion)
        #[arg(long)]
        agent_command: Option<String>,
    },
}

#[derive(Subcommand)]
enum AgentsCommands {
    /// List available agents
    List {
        /// Filter: all, specialists, custom
        #[arg(long, default_value = "all")]
        filter: String,
        /// Repo to load project-declared agents from, in addition to built-ins
        #[arg(long)]
        repo: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Create and migrate the approval-rule/audit-log database
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            init_cmd::run(db_url.as_deref(), force)?;
        }
        Commands::Plan { command } => match command {
            PlanCommands::Validate { file } => {
                plan_cmds::validate(&file)?;
            }
            PlanCommands::Run {
                file,
                max_agents,
                timeout,
                max_retries,
                agent_command,
            } => {
                plan_cmds::run(plan_cmds::RunArgs {
                    path: &file,
                    max_agents,
                    timeout_secs: timeout,
                    max_retries,
                    agent_command,
                })
                .await?;
            }
        },
        Commands::Spawn {
            agent_type,
            prompt,
            expected_output,
            worktree,
            base_branch,
            agent_command,
            dry_run,
        } => {
            spawn_cmd::run(spawn_cmd::SpawnArgs {
                agent_type,
                prompt,
                expected_output,
                worktree,
                base_branch,
                agent_command,
                dry_run,
            })
            .await?;
        }
        Commands::Agents { command } => match command {
            AgentsCommands::List { filter, repo } => {
                agents_cmd::run(&filter, repo.as_deref())?;
            }
        },
        Commands::Store { command } => match command {
            StoreCommands::Migrate => {
                let resolved = WardenCliConfig::resolve(cli.database_url.as_deref()).await;
                let store_config = resolved
                    .store
                    .context("no store configured: pass --database-url, set WARDEN_STORE_DATABASE_URL, or run `warden init --db-url ...`")?;
                db_cmd::run(&store_config).await?;
            }
        },
    }

    Ok(())
}
