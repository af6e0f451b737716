//! Human-readable push-line rendering for updates (spec §4.2).

use super::types::{ErrorKind, Update, UpdateKind};

fn error_emoji_and_label(kind: ErrorKind) -> (&'static str, &'static str) {
    match kind {
        ErrorKind::RateLimit => ("\u{23f3}", "Rate limited"),
        ErrorKind::Network => ("\u{1f4e1}", "Network error"),
        ErrorKind::Auth => ("\u{1f512}", "Auth error"),
        ErrorKind::Fatal => ("\u{1f480}", "Fatal error"),
        ErrorKind::Unknown => ("\u{26a0}\u{fe0f}", "Error"),
    }
}

/// Render an update as the single line pushed to a parent's handler
/// (spec §4.2):
/// - progress: `"[progress] <reporter>"`
/// - idle: `"[idle] <reason>"`
/// - error: `"<emoji> <label> (attempt a/b): Waiting Ns — <msg>"`
/// - completed: `"<id> completed: <status>"`
pub fn format_for_push(update: &Update) -> String {
    match &update.kind {
        UpdateKind::Progress { progress_report, .. } => format!("[progress] {progress_report}"),
        UpdateKind::Idle { idle_reason } => format!("[idle] {idle_reason}"),
        UpdateKind::Error {
            error,
            error_type,
            retry_info,
        } => {
            let (emoji, label) = error_emoji_and_label(*error_type);
            match retry_info {
                Some(retry) => {
                    let wait_s = retry
                        .next_retry_in_ms
                        .map(|ms| ms / 1000)
                        .unwrap_or(0);
                    format!(
                        "{emoji} {label} (attempt {}/{}): Waiting {wait_s}s \u{2014} {error}",
                        retry.attempt, retry.max_attempts
                    )
                }
                None => format!("{emoji} {label}: {error}"),
            }
        }
        UpdateKind::Failed { error } => format!("{} failed: {error}", update.sub_task_id),
        UpdateKind::Completed { result } => format!("{} completed: {result}", update.sub_task_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::RetryInfo;
    use uuid::Uuid;

    #[test]
    fn progress_line() {
        let u = Update::progress(Uuid::new_v4(), Uuid::new_v4(), 50, "50%");
        assert_eq!(format_for_push(&u), "[progress] 50%");
    }

    #[test]
    fn idle_line() {
        let u = Update::idle(Uuid::new_v4(), Uuid::new_v4(), "waiting for review");
        assert_eq!(format_for_push(&u), "[idle] waiting for review");
    }

    #[test]
    fn completed_line() {
        let sub = Uuid::new_v4();
        let u = Update::completed(sub, Uuid::new_v4(), "ok");
        assert_eq!(format_for_push(&u), format!("{sub} completed: ok"));
    }

    #[test]
    fn error_line_with_retry() {
        let sub = Uuid::new_v4();
        let parent = Uuid::new_v4();
        let u = Update {
            sub_task_id: sub,
            parent_worker_id: parent,
            timestamp: chrono::Utc::now(),
            kind: UpdateKind::Error {
                error: "429 from provider".to_string(),
                error_type: ErrorKind::RateLimit,
                retry_info: Some(RetryInfo {
                    attempt: 1,
                    max_attempts: 3,
                    will_retry: true,
                    next_retry_in_ms: Some(2000),
                }),
            },
        };
        assert_eq!(
            format_for_push(&u),
            "\u{23f3} Rate limited (attempt 1/3): Waiting 2s \u{2014} 429 from provider"
        );
    }
}
