//! The configuration collaborator interface (spec §6): keyed lookup for
//! `permissionLevel`, file-deny patterns, terminal deny/allow lists, and
//! the workspace-outside toggle.
//!
//! Config loading as a *product* (file formats, precedence chains, CLI
//! flags) is out of scope for this core -- that lives in `warden-cli`'s
//! `config` module, mirroring the teacher's split between
//! `gator_db::config::DbConfig` (a plain struct) and `gator-cli`'s own
//! `~/.config/gator/config.toml` resolution chain. This module only
//! defines the shape the router (C6) and discovery layer (C9) read from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::collaborators::ConfigProvider;

/// How aggressively the permission router auto-approves sensitive
/// operations before escalating (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Auto-approve nothing; every sensitive operation escalates.
    Strict,
    /// Auto-approve reads/writes matching the configured safe patterns.
    Standard,
    /// Auto-approve anything not explicitly denied.
    Permissive,
}

impl Default for PermissionLevel {
    fn default() -> Self {
        Self::Standard
    }
}

/// The resolved knobs the permission router and agent discovery layer
/// need (spec §6 "Config" collaborator interface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    pub permission_level: PermissionLevel,
    /// Glob-ish prefixes a `write` target must match to auto-approve
    /// inside a worktree (spec §4.6 `safeWritePatternsInWorktree`).
    pub file_deny_patterns: Vec<String>,
    /// Shell command prefixes that are always denied regardless of
    /// `safeCommands` (checked before auto-approval).
    pub terminal_deny_patterns: Vec<String>,
    /// Shell command prefixes that are always allowed outright.
    pub terminal_allow_patterns: Vec<String>,
    /// Whether a worker is allowed to touch paths outside its own
    /// worktree at all (if false, any such `write`/`shell` request with a
    /// target outside the worktree is denied before auto-approval logic
    /// runs).
    pub allow_outside_workspace: bool,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            permission_level: PermissionLevel::default(),
            file_deny_patterns: vec![
                ".env".to_string(),
                ".git/".to_string(),
                "*.pem".to_string(),
                "*.key".to_string(),
            ],
            terminal_deny_patterns: vec![
                "rm -rf /".to_string(),
                "sudo ".to_string(),
                ":(){ :|:& };:".to_string(),
            ],
            terminal_allow_patterns: Vec::new(),
            allow_outside_workspace: false,
        }
    }
}

impl WardenConfig {
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Resolve from a [`ConfigProvider`], falling back to defaults for any
    /// key that is absent or fails to parse. List-valued keys are read as
    /// comma-separated strings (e.g. `"*.pem,*.key"`).
    pub async fn from_provider(provider: &dyn ConfigProvider) -> Self {
        let mut config = Self::default();

        if let Some(level) = provider.get("permission_level").await {
            config.permission_level = match level.as_str() {
                "strict" => PermissionLevel::Strict,
                "permissive" => PermissionLevel::Permissive,
                _ => PermissionLevel::Standard,
            };
        }
        if let Some(patterns) = provider.get("file_deny_patterns").await {
            config.file_deny_patterns = split_csv(&patterns);
        }
        if let Some(patterns) = provider.get("terminal_deny_patterns").await {
            config.terminal_deny_patterns = split_csv(&patterns);
        }
        if let Some(patterns) = provider.get("terminal_allow_patterns").await {
            config.terminal_allow_patterns = split_csv(&patterns);
        }
        if let Some(toggle) = provider.get("allow_outside_workspace").await {
            config.allow_outside_workspace = toggle == "true" || toggle == "1";
        }

        config
    }

    /// Flatten back into key-value pairs, useful for seeding a
    /// [`crate::collaborators::StaticConfigProvider`] in tests.
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(
            "permission_level".to_string(),
            match self.permission_level {
                PermissionLevel::Strict => "strict",
                PermissionLevel::Standard => "standard",
                PermissionLevel::Permissive => "permissive",
            }
            .to_string(),
        );
        map.insert(
            "file_deny_patterns".to_string(),
            self.file_deny_patterns.join(","),
        );
        map.insert(
            "terminal_deny_patterns".to_string(),
            self.terminal_deny_patterns.join(","),
        );
        map.insert(
            "terminal_allow_patterns".to_string(),
            self.terminal_allow_patterns.join(","),
        );
        map.insert(
            "allow_outside_workspace".to_string(),
            self.allow_outside_workspace.to_string(),
        );
        map
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticConfigProvider;

    #[tokio::test]
    async fn defaults_when_provider_empty() {
        let provider = StaticConfigProvider::default();
        let config = WardenConfig::from_provider(&provider).await;
        assert_eq!(config.permission_level, PermissionLevel::Standard);
        assert!(!config.allow_outside_workspace);
    }

    #[tokio::test]
    async fn round_trips_through_map() {
        let mut config = WardenConfig::default();
        config.permission_level = PermissionLevel::Strict;
        config.allow_outside_workspace = true;
        let provider = StaticConfigProvider::new(config.to_map());
        let reloaded = WardenConfig::from_provider(&provider).await;
        assert_eq!(reloaded.permission_level, PermissionLevel::Strict);
        assert!(reloaded.allow_outside_workspace);
    }
}
