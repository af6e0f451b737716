//! The `Notifier` trait: how the permission router (C6) surfaces an
//! escalated approval request to a human (spec §4.6, "escalating to the
//! user").

use async_trait::async_trait;

/// Severity of a notification, loosely mirroring log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warn,
    Error,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Surface `message` to the operator. Returns the operator's free-form
    /// response, if the notification channel supports one (a CLI prompt
    /// might; a fire-and-forget desktop toast wouldn't).
    async fn notify(&self, level: NotifyLevel, message: &str) -> Option<String>;
}

// Compile-time assertion: Notifier must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Notifier) {}
};

/// A notifier that logs via `tracing` and never collects a response.
/// Sufficient for tests and for hosts that route escalations elsewhere.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, level: NotifyLevel, message: &str) -> Option<String> {
        match level {
            NotifyLevel::Info => tracing::info!(target: "warden::notify", "{message}"),
            NotifyLevel::Warn => tracing::warn!(target: "warden::notify", "{message}"),
            NotifyLevel::Error => tracing::error!(target: "warden::notify", "{message}"),
        }
        None
    }
}
