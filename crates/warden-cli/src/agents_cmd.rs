//! `warden agents list` command: enumerate available agents (spec §4.9,
//! C9), the same read `spawn_subtask` and friends would use via the tool
//! surface's `list_agents`.

use anyhow::{Context, Result};
use warden_core::discovery::{AgentDiscovery, AgentFilter};

pub fn run(filter: &str, repo: Option<&std::path::Path>) -> Result<()> {
    let parsed = match filter {
        "all" => AgentFilter::All,
        "specialists" => AgentFilter::Specialists,
        "custom" => AgentFilter::Custom,
        other => anyhow::bail!("invalid filter {other:?}; expected all|specialists|custom"),
    };

    let mut discovery = AgentDiscovery::new();
    if let Some(repo_path) = repo {
        let added = discovery
            .from_repo(repo_path)
            .with_context(|| format!("failed to load repo agents from {}", repo_path.display()))?;
        println!("Loaded {added} repo-declared agent(s) from {}", repo_path.display());
    }

    let agents = discovery.list(parsed);
    if agents.is_empty() {
        println!("No agents match filter {filter:?}.");
        return Ok(());
    }

    for agent in agents {
        println!("{:<20} [{:?}]  {}", agent.id, agent.source, agent.name);
        println!("    {}", agent.description);
        println!("    tools: {}", agent.tools.join(", "));
        if let Some(backend) = &agent.backend {
            println!("    backend: {backend}");
        }
    }

    Ok(())
}
