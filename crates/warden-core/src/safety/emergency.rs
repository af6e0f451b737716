//! Emergency stop: a scoped broadcast that cancels and reaps subtasks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The scope of an emergency stop (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyScope {
    Subtask { worker_id: Uuid, sub_task_id: Uuid },
    Worker { worker_id: Uuid },
    Plan { plan_id: Uuid },
    Global,
}

/// Result of running an emergency stop (spec §3).
#[derive(Debug, Clone)]
pub struct EmergencyStopResult {
    pub sub_tasks_killed: usize,
    pub killed_sub_task_ids: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// A listener notified when an emergency stop runs, before ledger
/// cleanup (spec §4.1). [`crate::subtask::SubTaskManager`] is the
/// primary subscriber: it translates the scope into cancellation-token
/// trips for the affected subtasks (spec §5).
#[derive(Clone)]
pub struct EmergencyStopSubscriber {
    callback: Arc<dyn Fn(&EmergencyScope, &[Uuid]) + Send + Sync>,
}

impl EmergencyStopSubscriber {
    pub fn new(callback: impl Fn(&EmergencyScope, &[Uuid]) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub fn notify(&self, scope: &EmergencyScope, affected: &[Uuid]) {
        (self.callback)(scope, affected);
    }
}

impl std::fmt::Debug for EmergencyStopSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyStopSubscriber").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscriber_is_invoked_with_affected_ids() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let sub = EmergencyStopSubscriber::new(move |_scope, affected| {
            calls_clone.fetch_add(affected.len(), Ordering::SeqCst);
        });
        let id = Uuid::new_v4();
        sub.notify(&EmergencyScope::Subtask { worker_id: Uuid::new_v4(), sub_task_id: id }, &[id]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
