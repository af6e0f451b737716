//! Agent discovery and auto-approval policy defaults (spec §4.9, C9).
//!
//! Generalizes the teacher's `HarnessRegistry` (a name-keyed map of live
//! harness instances) to agent *descriptors*: static metadata an
//! orchestrator or tool surface can enumerate without having spun
//! anything up yet. Built-ins are embedded at compile time the way the
//! teacher embeds `invariants.toml` via `presets::load_presets`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::permission::PermissionPolicy;

/// Where an agent descriptor came from (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentSource {
    Builtin,
    Repo,
}

/// Filter for [`AgentDiscovery::list`] (spec §4.7 `list_agents`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentFilter {
    All,
    Specialists,
    Custom,
}

/// Static metadata about one available agent (spec §4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub source: AgentSource,
    pub tools: Vec<String>,
    pub backend: Option<String>,
    pub has_architecture_access: bool,
}

impl AgentDescriptor {
    /// "Specialist" agents are the fixed built-in roster; "custom" agents
    /// are anything a repo declares for itself.
    fn matches(&self, filter: AgentFilter) -> bool {
        match filter {
            AgentFilter::All => true,
            AgentFilter::Specialists => self.source == AgentSource::Builtin,
            AgentFilter::Custom => self.source == AgentSource::Repo,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAgent {
    id: String,
    name: String,
    description: String,
    tools: Vec<String>,
    #[serde(default)]
    backend: Option<String>,
    #[serde(default)]
    has_architecture_access: bool,
}

#[derive(Debug, Deserialize)]
struct AgentLibrary {
    agents: Vec<RawAgent>,
}

static BUILTIN_AGENTS_TOML: &str = include_str!("agents.toml");

/// Parse and return the built-in agent roster.
///
/// # Panics
///
/// Panics if the embedded TOML is malformed -- a compile-time invariant;
/// if the binary built, the TOML parsed.
pub fn builtin_agents() -> Vec<AgentDescriptor> {
    let lib: AgentLibrary =
        toml::from_str(BUILTIN_AGENTS_TOML).expect("embedded agents.toml is invalid");
    lib.agents
        .into_iter()
        .map(|raw| AgentDescriptor {
            id: raw.id,
            name: raw.name,
            description: raw.description,
            source: AgentSource::Builtin,
            tools: raw.tools,
            backend: raw.backend,
            has_architecture_access: raw.has_architecture_access,
        })
        .collect()
}

/// Registry of available agents (spec §4.9), plus the default policy
/// handed to the permission router (C6).
#[derive(Debug, Clone)]
pub struct AgentDiscovery {
    agents: HashMap<String, AgentDescriptor>,
    policy: PermissionPolicy,
}

impl Default for AgentDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentDiscovery {
    /// A fresh registry seeded with the built-in roster and default
    /// auto-approval policy.
    pub fn new() -> Self {
        let mut agents = HashMap::new();
        for agent in builtin_agents() {
            agents.insert(agent.id.clone(), agent);
        }
        Self {
            agents,
            policy: PermissionPolicy::default(),
        }
    }

    /// Register or replace a repo-declared agent. Returns the previous
    /// descriptor with the same id, if any.
    pub fn register(&mut self, agent: AgentDescriptor) -> Option<AgentDescriptor> {
        self.agents.insert(agent.id.clone(), agent)
    }

    pub fn get(&self, id: &str) -> Option<&AgentDescriptor> {
        self.agents.get(id)
    }

    /// Enumerate agents matching `filter` (spec §4.7 `list_agents`).
    pub fn list(&self, filter: AgentFilter) -> Vec<&AgentDescriptor> {
        self.agents.values().filter(|a| a.matches(filter)).collect()
    }

    /// Override the permission policy handed to C6 (spec §4.9 "may be
    /// overridden").
    pub fn set_policy(&mut self, policy: PermissionPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    /// Load repo-declared agents from a `agents.toml` under `repo_path`,
    /// if present. A missing file is not an error -- repos aren't
    /// required to declare custom agents.
    pub fn from_repo(&mut self, repo_path: &Path) -> Result<usize, std::io::Error> {
        let candidate = repo_path.join("agents.toml");
        let Ok(contents) = std::fs::read_to_string(&candidate) else {
            return Ok(0);
        };
        let lib: AgentLibrary = toml::from_str(&contents).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        let count = lib.agents.len();
        for raw in lib.agents {
            self.register(AgentDescriptor {
                id: raw.id,
                name: raw.name,
                description: raw.description,
                source: AgentSource::Repo,
                tools: raw.tools,
                backend: raw.backend,
                has_architecture_access: raw.has_architecture_access,
            });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_roster_parses() {
        let agents = builtin_agents();
        assert!(agents.iter().any(|a| a.id == "@architect"));
        assert!(agents.iter().all(|a| a.source == AgentSource::Builtin));
    }

    #[test]
    fn discovery_lists_builtins_by_default() {
        let discovery = AgentDiscovery::new();
        assert!(!discovery.list(AgentFilter::All).is_empty());
        assert!(discovery.list(AgentFilter::Custom).is_empty());
    }

    #[test]
    fn register_custom_agent_is_listed_separately() {
        let mut discovery = AgentDiscovery::new();
        discovery.register(AgentDescriptor {
            id: "@my-custom".to_string(),
            name: "Custom".to_string(),
            description: "repo specific".to_string(),
            source: AgentSource::Repo,
            tools: vec!["read".to_string()],
            backend: None,
            has_architecture_access: false,
        });
        assert_eq!(discovery.list(AgentFilter::Custom).len(), 1);
        assert!(discovery.get("@my-custom").is_some());
    }

    #[test]
    fn from_repo_with_no_agents_toml_is_a_noop() {
        let mut discovery = AgentDiscovery::new();
        let tmp = tempfile::TempDir::new().unwrap();
        let added = discovery.from_repo(tmp.path()).unwrap();
        assert_eq!(added, 0);
    }
}
