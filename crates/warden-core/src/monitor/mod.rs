//! Task monitor / update bus (spec §4.2, C2).
//!
//! Per-parent FIFO queues of child updates, plus a push registry for
//! standalone parents that don't poll. Queueing is non-blocking; draining
//! is atomic per parent.

mod format;
mod types;

pub use format::format_for_push;
pub use types::{ErrorKind, RetryInfo, Update, UpdateKind};

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Maximum number of non-terminal `progress` updates retained per parent
/// queue before the oldest is dropped to bound memory (spec §4.2, §9 open
/// question resolved in favor of this concrete policy). `completed`,
/// `failed`, and `error` updates are never dropped.
const MAX_PROGRESS_BACKLOG_PER_PARENT: usize = 1000;

/// Maximum number of updates kept per subtask in the event log
/// (SPEC_FULL.md-added "Agent event log"). Independent of the live FIFO
/// queue above: this one is never drained by `consume_updates`, so a CLI
/// `log` command has something to show after the queue has already been
/// polled empty.
const MAX_EVENT_LOG_PER_SUB_TASK: usize = 500;

type PushHandler = Arc<dyn Fn(String) + Send + Sync>;

/// The update bus.
#[derive(Default)]
pub struct UpdateBus {
    queues: Mutex<HashMap<Uuid, VecDeque<Update>>>,
    /// sub_task_id -> parent_worker_id, recorded by `start_monitoring`.
    routes: Mutex<HashMap<Uuid, Uuid>>,
    push_handlers: Mutex<HashMap<Uuid, PushHandler>>,
    /// sub_task_id -> every update ever emitted for it, oldest-dropped-first
    /// once `MAX_EVENT_LOG_PER_SUB_TASK` is exceeded. In-memory only; dies
    /// with the process (no durability claim, per spec's Non-goal).
    event_log: Mutex<HashMap<Uuid, VecDeque<Update>>>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `sub_task_id`'s updates route to `parent_worker_id`.
    pub fn start_monitoring(&self, sub_task_id: Uuid, parent_worker_id: Uuid) {
        self.routes
            .lock()
            .unwrap()
            .insert(sub_task_id, parent_worker_id);
    }

    /// Append an update to its parent's queue and, if a push handler is
    /// registered for that parent, invoke it synchronously with a
    /// formatted line.
    ///
    /// Ordering: within a single `parent_worker_id` queue, updates appear
    /// in the order `queue_update` was called (spec §4.2, §8).
    pub fn queue_update(&self, update: Update) {
        let parent = update.parent_worker_id;
        let is_terminal = update.kind.is_terminal();

        {
            let mut queues = self.queues.lock().unwrap();
            let queue = queues.entry(parent).or_default();
            queue.push_back(update.clone());

            if !is_terminal {
                while queue.len() > MAX_PROGRESS_BACKLOG_PER_PARENT {
                    // Drop the oldest non-terminal `progress` update; never
                    // drop completed/failed/error (spec §4.2).
                    if let Some(pos) = queue
                        .iter()
                        .position(|u| matches!(u.kind, UpdateKind::Progress { .. }))
                    {
                        queue.remove(pos);
                    } else {
                        break;
                    }
                }
            }
        }

        if let Some(handler) = self.push_handlers.lock().unwrap().get(&parent).cloned() {
            handler(format::format_for_push(&update));
        }

        let mut log = self.event_log.lock().unwrap();
        let entry = log.entry(update.sub_task_id).or_default();
        entry.push_back(update);
        while entry.len() > MAX_EVENT_LOG_PER_SUB_TASK {
            entry.pop_front();
        }
    }

    /// Return the full event log recorded for a subtask, oldest first.
    /// Unlike [`UpdateBus::consume_updates`] this never drains -- it's a
    /// read-only history, not a work queue.
    pub fn event_log(&self, sub_task_id: Uuid) -> Vec<Update> {
        self.event_log
            .lock()
            .unwrap()
            .get(&sub_task_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drain and return the current queue for a parent, atomically.
    pub fn consume_updates(&self, parent_worker_id: Uuid) -> Vec<Update> {
        let mut queues = self.queues.lock().unwrap();
        match queues.get_mut(&parent_worker_id) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Register a push handler for a standalone parent. Last-writer-wins;
    /// passing `None` disposes of any existing handler (spec §4.2).
    pub fn register_standalone_parent_handler(
        &self,
        parent_id: Uuid,
        handler: Option<impl Fn(String) + Send + Sync + 'static>,
    ) {
        let mut handlers = self.push_handlers.lock().unwrap();
        match handler {
            Some(f) => {
                handlers.insert(parent_id, Arc::new(f));
            }
            None => {
                handlers.remove(&parent_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn progress_update(parent: Uuid, sub: Uuid, pct: u8) -> Update {
        Update {
            sub_task_id: sub,
            parent_worker_id: parent,
            timestamp: chrono::Utc::now(),
            kind: UpdateKind::Progress {
                progress: pct,
                progress_report: format!("{pct}%"),
            },
        }
    }

    fn idle_update(parent: Uuid, sub: Uuid, reason: &str) -> Update {
        Update {
            sub_task_id: sub,
            parent_worker_id: parent,
            timestamp: chrono::Utc::now(),
            kind: UpdateKind::Idle {
                idle_reason: reason.to_string(),
            },
        }
    }

    #[test]
    fn updates_drain_in_submission_order() {
        let bus = UpdateBus::new();
        let parent = Uuid::new_v4();
        let sub = Uuid::new_v4();
        bus.start_monitoring(sub, parent);

        bus.queue_update(progress_update(parent, sub, 50));
        bus.queue_update(idle_update(parent, sub, "waiting"));

        let drained = bus.consume_updates(parent);
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0].kind, UpdateKind::Progress { progress: 50, .. }));
        assert!(matches!(drained[1].kind, UpdateKind::Idle { .. }));

        // Subsequent poll returns empty.
        assert!(bus.consume_updates(parent).is_empty());
    }

    #[test]
    fn consume_is_a_prefix_of_everything_accepted() {
        let bus = UpdateBus::new();
        let parent = Uuid::new_v4();
        let sub = Uuid::new_v4();

        bus.queue_update(progress_update(parent, sub, 10));
        let first_drain = bus.consume_updates(parent);
        bus.queue_update(progress_update(parent, sub, 20));
        let second_drain = bus.consume_updates(parent);

        assert_eq!(first_drain.len(), 1);
        assert_eq!(second_drain.len(), 1);
        assert!(matches!(first_drain[0].kind, UpdateKind::Progress { progress: 10, .. }));
        assert!(matches!(second_drain[0].kind, UpdateKind::Progress { progress: 20, .. }));
    }

    #[test]
    fn push_handler_receives_formatted_line() {
        let bus = UpdateBus::new();
        let parent = Uuid::new_v4();
        let sub = Uuid::new_v4();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        bus.register_standalone_parent_handler(
            parent,
            Some(move |line: String| received_clone.lock().unwrap().push(line)),
        );

        bus.queue_update(idle_update(parent, sub, "waiting for input"));

        let lines = received.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "[idle] waiting for input");
    }

    #[test]
    fn register_standalone_parent_handler_last_writer_wins() {
        let bus = UpdateBus::new();
        let parent = Uuid::new_v4();
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));

        let a = Arc::clone(&count_a);
        bus.register_standalone_parent_handler(parent, Some(move |_: String| {
            a.fetch_add(1, Ordering::SeqCst);
        }));
        let b = Arc::clone(&count_b);
        bus.register_standalone_parent_handler(parent, Some(move |_: String| {
            b.fetch_add(1, Ordering::SeqCst);
        }));

        bus.queue_update(idle_update(parent, Uuid::new_v4(), "x"));

        assert_eq!(count_a.load(Ordering::SeqCst), 0);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_removes_handler() {
        let bus = UpdateBus::new();
        let parent = Uuid::new_v4();
        let called = Arc::new(AtomicUsize::new(0));
        let called_clone = Arc::clone(&called);
        bus.register_standalone_parent_handler(parent, Some(move |_: String| {
            called_clone.fetch_add(1, Ordering::SeqCst);
        }));
        bus.register_standalone_parent_handler(parent, None::<fn(String)>);
        bus.queue_update(idle_update(parent, Uuid::new_v4(), "x"));
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn event_log_survives_consume_updates() {
        let bus = UpdateBus::new();
        let parent = Uuid::new_v4();
        let sub = Uuid::new_v4();

        bus.queue_update(progress_update(parent, sub, 10));
        bus.queue_update(progress_update(parent, sub, 20));
        bus.consume_updates(parent);

        let log = bus.event_log(sub);
        assert_eq!(log.len(), 2);
        assert!(matches!(log[0].kind, UpdateKind::Progress { progress: 10, .. }));
        assert!(bus.consume_updates(parent).is_empty());
    }

    #[test]
    fn event_log_is_bounded_per_sub_task() {
        let bus = UpdateBus::new();
        let parent = Uuid::new_v4();
        let sub = Uuid::new_v4();

        for i in 0..(MAX_EVENT_LOG_PER_SUB_TASK + 10) {
            bus.queue_update(progress_update(parent, sub, (i % 100) as u8));
        }

        assert_eq!(bus.event_log(sub).len(), MAX_EVENT_LOG_PER_SUB_TASK);
    }

    #[test]
    fn different_parents_have_independent_queues() {
        let bus = UpdateBus::new();
        let parent_a = Uuid::new_v4();
        let parent_b = Uuid::new_v4();
        bus.queue_update(progress_update(parent_a, Uuid::new_v4(), 1));
        assert_eq!(bus.consume_updates(parent_b).len(), 0);
        assert_eq!(bus.consume_updates(parent_a).len(), 1);
    }
}
