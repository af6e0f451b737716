//! Configuration file management for the `warden` CLI.
//!
//! Provides a TOML config file at `~/.config/warden/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default. Mirrors
//! the teacher's `gator-cli::config` module, minus the auth section --
//! this CLI has no token-secret story (see [`crate::guard`]).

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use warden_core::collaborators::StaticConfigProvider;
use warden_core::config::WardenConfig;
use warden_store::StoreConfig;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub store: Option<StoreSection>,
    #[serde(default)]
    pub policy: Option<PolicySection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSection {
    pub database_url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PolicySection {
    #[serde(default)]
    pub permission_level: Option<String>,
    #[serde(default)]
    pub file_deny_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub terminal_deny_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub terminal_allow_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub allow_outside_workspace: Option<bool>,
}

/// Return the warden config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/warden` or `~/.config/warden`.
/// Deliberately ignores the platform-specific `dirs::config_dir()`, which
/// returns `~/Library/Application Support` on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("warden");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("warden")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct WardenCliConfig {
    /// `None` means: run fully in-process, no approval-rule/audit-log
    /// persistence (the core's default; see `warden-core::collaborators::ApprovalStore`).
    pub store: Option<StoreConfig>,
    pub policy: WardenConfig,
}

impl WardenCliConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - Store URL: `cli_database_url` > `WARDEN_STORE_DATABASE_URL` env >
    ///   `config_file.store.database_url` > `None` (no persistence).
    /// - Policy: `config_file.policy` fields > [`WardenConfig::default`]
    ///   for any field left unset.
    pub async fn resolve(cli_database_url: Option<&str>) -> Self {
        let file_config = load_config().ok();

        let database_url = cli_database_url
            .map(|s| s.to_string())
            .or_else(|| std::env::var("WARDEN_STORE_DATABASE_URL").ok())
            .or_else(|| {
                file_config
                    .as_ref()
                    .and_then(|c| c.store.as_ref())
                    .map(|s| s.database_url.clone())
            });
        let store = database_url.map(StoreConfig::new);

        let policy = match file_config.as_ref().and_then(|c| c.policy.as_ref()) {
            Some(section) => policy_from_section(section).await,
            None => WardenConfig::default(),
        };

        Self { store, policy }
    }
}

async fn policy_from_section(section: &PolicySection) -> WardenConfig {
    let mut map = HashMap::new();
    if let Some(level) = &section.permission_level {
        map.insert("permission_level".to_string(), level.clone());
    }
    if let Some(patterns) = &section.file_deny_patterns {
        map.insert("file_deny_patterns".to_string(), patterns.join(","));
    }
    if let Some(patterns) = &section.terminal_deny_patterns {
        map.insert("terminal_deny_patterns".to_string(), patterns.join(","));
    }
    if let Some(patterns) = &section.terminal_allow_patterns {
        map.insert("terminal_allow_patterns".to_string(), patterns.join(","));
    }
    if let Some(toggle) = section.allow_outside_workspace {
        map.insert("allow_outside_workspace".to_string(), toggle.to_string());
    }

    WardenConfig::from_provider(&StaticConfigProvider::new(map)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_prefers_cli_flag_over_everything_else() {
        unsafe { std::env::remove_var("WARDEN_STORE_DATABASE_URL") };

        let cfg = WardenCliConfig::resolve(Some("postgresql://cli:5432/clidb")).await;
        assert_eq!(
            cfg.store.unwrap().database_url,
            "postgresql://cli:5432/clidb"
        );
    }

    #[tokio::test]
    async fn resolve_falls_back_to_env_var() {
        unsafe { std::env::set_var("WARDEN_STORE_DATABASE_URL", "postgresql://env:5432/envdb") };
        let cfg = WardenCliConfig::resolve(None).await;
        unsafe { std::env::remove_var("WARDEN_STORE_DATABASE_URL") };
        assert_eq!(cfg.store.unwrap().database_url, "postgresql://env:5432/envdb");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(path.ends_with("warden/config.toml"));
    }

    #[tokio::test]
    async fn policy_section_round_trips_through_map() {
        let section = PolicySection {
            permission_level: Some("strict".to_string()),
            file_deny_patterns: Some(vec!["*.pem".to_string()]),
            terminal_deny_patterns: None,
            terminal_allow_patterns: None,
            allow_outside_workspace: Some(true),
        };
        let policy = policy_from_section(&section).await;
        assert!(policy.allow_outside_workspace);
        assert_eq!(policy.file_deny_patterns, vec!["*.pem".to_string()]);
    }
}
