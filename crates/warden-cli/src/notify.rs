//! `CliNotifier`: the concrete "ask user" function behind
//! `warden_core::permission`'s escalation path (spec §4.6 step 4/5, §1
//! "the permission decision UI... is also a collaborator; the router
//! only calls an opaque 'ask user' function").
//!
//! Prompts on stdout, reads a one-line answer from stdin. Blocking I/O is
//! pushed onto `spawn_blocking` so it never stalls the async runtime the
//! permission router is suspended on (spec §5 "Suspension points").

use async_trait::async_trait;
use warden_core::collaborators::{NotifyLevel, Notifier};

pub struct CliNotifier;

#[async_trait]
impl Notifier for CliNotifier {
    async fn notify(&self, level: NotifyLevel, message: &str) -> Option<String> {
        let prefix = match level {
            NotifyLevel::Info => "info",
            NotifyLevel::Warn => "approval needed",
            NotifyLevel::Error => "error",
        };
        println!("[{prefix}] {message} [approve/deny] ");

        tokio::task::spawn_blocking(|| {
            use std::io::BufRead;
            let stdin = std::io::stdin();
            let mut line = String::new();
            stdin.lock().read_line(&mut line).ok()?;
            let answer = line.trim().to_lowercase();
            if answer.is_empty() { None } else { Some(answer) }
        })
        .await
        .unwrap_or(None)
    }
}
