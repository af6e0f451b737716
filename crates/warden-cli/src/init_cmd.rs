//! `warden init` command: write a config file, no database required.
//!
//! Mirrors `gator init` minus the auth/token-secret section -- this CLI
//! has no agent-mode bearer token to generate, since the tool surface
//! (C7) is reached in-process by whatever embeds `warden-core`, not over
//! a network boundary this CLI has to authenticate.

use anyhow::{Context, Result, bail};

use crate::config::{self, ConfigFile, StoreSection};

pub fn run(db_url: Option<&str>, force: bool) -> Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = ConfigFile {
        store: db_url.map(|url| StoreSection {
            database_url: url.to_string(),
        }),
        policy: None,
    };

    config::save_config(&cfg).context("failed to write config file")?;

    println!("Config written to {}", path.display());
    match db_url {
        Some(url) => println!("  store.database_url = {url}"),
        None => println!("  store: none (approval rules/audit log run in-process only)"),
    }
    println!();
    println!("Next: `warden plan validate <plan.toml>` to check a plan file, or");
    println!("      `warden plan run <plan.toml>` to dispatch one.");

    Ok(())
}
