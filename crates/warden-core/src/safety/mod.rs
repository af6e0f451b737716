//! Safety limits engine (spec §4.1, C1).
//!
//! Depth policy, cycle detection, rate/total/parallel caps, cost ledger,
//! and emergency stop. Every check here returns a typed [`WardenError`];
//! there is no silent-allow path (spec §4.1 "Failure modes").
//!
//! # Locking
//!
//! Each data structure (ancestry map, rate-limit windows, cost table,
//! emergency-stop ledger) is guarded by its own `Mutex`, matching the
//! fixed acquisition order from spec §5 (`plan -> task -> worker ->
//! subtask -> safety`): this module is always the last lock taken by a
//! caller, never the first, so it never needs to reach back out to
//! acquire a plan/task/worker lock itself.

mod ancestry;
mod cost;
mod emergency;
mod limits;

pub use ancestry::{hash_prompt, AncestryEntry, AncestryError};
pub use cost::{CostEntry, CostTable, ModelRate};
pub use emergency::{EmergencyScope, EmergencyStopResult, EmergencyStopSubscriber};
pub use limits::{RateLimitWindow, SafetyLimitsConfig};

use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::WardenError;
use crate::identity::SpawnContext;

/// The composed safety-limits engine.
///
/// Holds every piece of mutable ledger state C1 is responsible for. Cheap
/// to construct (`SafetyLimits::new`); intended to be wrapped in an `Arc`
/// and shared across the orchestrator, subtask manager, and tool surface.
#[derive(Debug)]
pub struct SafetyLimits {
    config: SafetyLimitsConfig,
    ancestry: Mutex<HashMap<Uuid, ancestry::AncestryEntry>>,
    /// worker_id -> spawn timestamps within the trailing window.
    rate_windows: Mutex<HashMap<Uuid, limits::RateLimitWindow>>,
    cost: Mutex<cost::CostTable>,
    /// worker_id -> subtask ids spawned by that worker (for cost
    /// aggregation and for emergency-stop(scope=worker)).
    worker_subtasks: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    emergency_subscribers: Mutex<Vec<emergency::EmergencyStopSubscriber>>,
}

impl SafetyLimits {
    pub fn new(config: SafetyLimitsConfig) -> Self {
        Self {
            config,
            ancestry: Mutex::new(HashMap::new()),
            rate_windows: Mutex::new(HashMap::new()),
            cost: Mutex::new(cost::CostTable::new()),
            worker_subtasks: Mutex::new(HashMap::new()),
            emergency_subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SafetyLimitsConfig {
        &self.config
    }

    /// Enforce the depth policy (spec §4.1).
    ///
    /// `parent_depth` is the depth of the *parent* worker (the one
    /// requesting a spawn); `spawn_context` is the parent's own spawn
    /// context, already translated by the caller per spec §4.3 step 2
    /// (a parent whose own root is not the orchestrator reports `Agent`
    /// here even if its literal `spawn_context` field is `Subtask`).
    pub fn enforce_depth_limit(
        &self,
        parent_depth: u32,
        spawn_context: SpawnContext,
    ) -> Result<(), WardenError> {
        let max_depth = self.config.effective_max_depth(spawn_context);
        if parent_depth >= max_depth {
            return Err(WardenError::DepthLimitExceeded {
                parent_depth,
                max_depth,
                context: spawn_context,
            });
        }
        Ok(())
    }

    /// Detect a cycle in a proposed ancestry chain (spec §4.1).
    ///
    /// `chain` is root-to-leaf inclusive of the proposed new entry.
    pub fn detect_cycle(&self, chain: &[ancestry::AncestryEntry]) -> Result<(), WardenError> {
        ancestry::detect_cycle(chain)
    }

    /// Register an ancestry entry, keyed by its `sub_task_id`.
    pub fn register_ancestry(&self, entry: ancestry::AncestryEntry) {
        let mut guard = self.ancestry.lock().unwrap();
        let worker_id = entry.worker_id;
        let sub_task_id = entry.sub_task_id;
        guard.insert(sub_task_id, entry);
        drop(guard);
        self.worker_subtasks
            .lock()
            .unwrap()
            .entry(worker_id)
            .or_default()
            .push(sub_task_id);
    }

    /// Clear an ancestry entry once its subtask has reached a terminal
    /// state and its chain is no longer needed for cycle detection.
    pub fn clear_ancestry(&self, sub_task_id: Uuid) {
        self.ancestry.lock().unwrap().remove(&sub_task_id);
    }

    /// Reconstruct the root-to-leaf ancestry chain ending at `sub_task_id`.
    pub fn get_ancestry_chain(&self, sub_task_id: Uuid) -> Vec<ancestry::AncestryEntry> {
        let guard = self.ancestry.lock().unwrap();
        let mut chain = Vec::new();
        let mut cursor = Some(sub_task_id);
        while let Some(id) = cursor {
            match guard.get(&id) {
                Some(entry) => {
                    cursor = entry.parent_sub_task_id;
                    chain.push(entry.clone());
                }
                None => break,
            }
        }
        chain.reverse();
        chain
    }

    /// Build the proposed ancestry chain for a new subtask (parent chain
    /// extended with one new entry), without registering it.
    pub fn propose_ancestry(
        &self,
        parent_sub_task_id: Option<Uuid>,
        new_entry: ancestry::AncestryEntry,
    ) -> Vec<ancestry::AncestryEntry> {
        let mut chain = match parent_sub_task_id {
            Some(id) => self.get_ancestry_chain(id),
            None => Vec::new(),
        };
        chain.push(new_entry);
        chain
    }

    /// Check the sliding 60s rate window for a worker (spec §4.1).
    pub fn check_rate_limit(&self, worker_id: Uuid, now: std::time::Instant) -> Result<(), WardenError> {
        let mut windows = self.rate_windows.lock().unwrap();
        let window = windows.entry(worker_id).or_default();
        window.trim(now);
        if window.count() >= self.config.sub_task_spawn_rate_limit {
            return Err(WardenError::RateLimitExceeded {
                worker_id,
                count: window.count(),
                limit: self.config.sub_task_spawn_rate_limit,
            });
        }
        Ok(())
    }

    /// Record a spawn timestamp for the rate window. Call only after all
    /// other checks in `create_subtask` have passed (spec §4.3 step 5).
    pub fn record_spawn(&self, worker_id: Uuid, now: std::time::Instant) {
        self.rate_windows
            .lock()
            .unwrap()
            .entry(worker_id)
            .or_default()
            .push(now);
    }

    /// Check the total-subtasks-per-worker cap (spec §4.1).
    pub fn check_total_limit(&self, worker_id: Uuid, count: usize) -> Result<(), WardenError> {
        if count >= self.config.max_sub_tasks_per_worker {
            return Err(WardenError::TotalLimitExceeded {
                worker_id,
                count,
                limit: self.config.max_sub_tasks_per_worker,
            });
        }
        Ok(())
    }

    /// Check the parallel-running-subtasks cap (spec §4.1).
    pub fn check_parallel_limit(&self, worker_id: Uuid, running: usize) -> Result<(), WardenError> {
        if running >= self.config.max_parallel_sub_tasks {
            return Err(WardenError::ParallelLimitExceeded {
                worker_id,
                running,
                limit: self.config.max_parallel_sub_tasks,
            });
        }
        Ok(())
    }

    /// Record the cost of a completed (or in-progress) subtask.
    pub fn track_subtask_cost(&self, entry: cost::CostEntry) {
        self.cost.lock().unwrap().record(entry);
    }

    /// Total accrued cost (dollars) for a worker: its own direct cost (if
    /// it has any cost entries recorded under its own id -- e.g. a
    /// top-level deployed task-worker billed directly rather than through
    /// a spawned subtask) plus every subtask the ancestry map attributes
    /// to it as a spawning parent.
    pub fn get_total_cost_for_worker(&self, worker_id: Uuid) -> f64 {
        let sub_task_ids = self
            .worker_subtasks
            .lock()
            .unwrap()
            .get(&worker_id)
            .cloned()
            .unwrap_or_default();
        let cost = self.cost.lock().unwrap();
        let own = cost.cost_for_subtask(worker_id);
        let children: f64 = sub_task_ids.iter().map(|id| cost.cost_for_subtask(*id)).sum();
        own + children
    }

    /// Register a listener to be invoked (in registration order) whenever
    /// [`SafetyLimits::emergency_stop`] runs, *before* ledger cleanup
    /// (spec §4.1 "Emits the event before local ledger cleanup").
    pub fn on_emergency_stop(&self, subscriber: emergency::EmergencyStopSubscriber) {
        self.emergency_subscribers.lock().unwrap().push(subscriber);
    }

    /// Run an emergency stop for the given scope.
    ///
    /// Returns the set of subtask ids considered "killed" by this scope,
    /// which is exactly the set of ancestry entries whose subtree root
    /// matches the scope target -- running it twice in a row for the same
    /// scope returns a shrinking (eventually empty) set, since the first
    /// call clears the ancestry for everything it killed (spec §8
    /// idempotence property).
    pub fn emergency_stop(
        &self,
        scope: emergency::EmergencyScope,
        reason: impl Into<String>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> emergency::EmergencyStopResult {
        let reason = reason.into();
        let affected = self.affected_subtasks(&scope);

        // 1. Notify subscribers first (so e.g. C3 can cancel live work)
        //    before we touch any ledger.
        for sub in self.emergency_subscribers.lock().unwrap().iter() {
            sub.notify(&scope, &affected);
        }

        // 2. Ledger cleanup.
        {
            let mut ancestry = self.ancestry.lock().unwrap();
            for id in &affected {
                ancestry.remove(id);
            }
        }
        if let emergency::EmergencyScope::Worker { worker_id }
        | emergency::EmergencyScope::Subtask { worker_id, .. } = &scope
        {
            self.rate_windows.lock().unwrap().remove(worker_id);
            self.worker_subtasks.lock().unwrap().remove(worker_id);
        }
        if matches!(scope, emergency::EmergencyScope::Global) {
            self.rate_windows.lock().unwrap().clear();
            self.worker_subtasks.lock().unwrap().clear();
        }

        emergency::EmergencyStopResult {
            sub_tasks_killed: affected.len(),
            killed_sub_task_ids: affected,
            timestamp: now,
            reason,
        }
    }

    /// Which subtask ids are in-scope for a given emergency-stop scope,
    /// based on the current ancestry map.
    fn affected_subtasks(&self, scope: &emergency::EmergencyScope) -> Vec<Uuid> {
        let ancestry = self.ancestry.lock().unwrap();
        match scope {
            emergency::EmergencyScope::Subtask { sub_task_id, .. } => {
                if ancestry.contains_key(sub_task_id) {
                    vec![*sub_task_id]
                } else {
                    vec![]
                }
            }
            emergency::EmergencyScope::Worker { worker_id } => ancestry
                .values()
                .filter(|e| e.worker_id == *worker_id)
                .map(|e| e.sub_task_id)
                .collect(),
            emergency::EmergencyScope::Plan { plan_id } => ancestry
                .values()
                .filter(|e| e.plan_id == Some(*plan_id))
                .map(|e| e.sub_task_id)
                .collect(),
            emergency::EmergencyScope::Global => ancestry.keys().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SpawnContext;

    fn engine() -> SafetyLimits {
        SafetyLimits::new(SafetyLimitsConfig::default())
    }

    #[test]
    fn orchestrator_depth_boundary() {
        let s = engine();
        // effectiveMax - 1 succeeds
        assert!(s.enforce_depth_limit(1, SpawnContext::Orchestrator).is_ok());
        // effectiveMax rejects
        assert!(s
            .enforce_depth_limit(2, SpawnContext::Orchestrator)
            .is_err());
    }

    #[test]
    fn agent_chain_capped_at_one() {
        let s = engine();
        assert!(s.enforce_depth_limit(0, SpawnContext::Agent).is_ok());
        assert!(s.enforce_depth_limit(1, SpawnContext::Agent).is_err());
    }

    #[test]
    fn emergency_stop_is_idempotent() {
        let s = engine();
        let worker = Uuid::new_v4();
        let sub = Uuid::new_v4();
        s.register_ancestry(ancestry::AncestryEntry {
            sub_task_id: sub,
            parent_sub_task_id: None,
            worker_id: worker,
            plan_id: None,
            agent_type: "@architect".to_string(),
            prompt_hash: hash_prompt("design api"),
        });

        let first = s.emergency_stop(
            emergency::EmergencyScope::Subtask {
                worker_id: worker,
                sub_task_id: sub,
            },
            "test",
            chrono::Utc::now(),
        );
        assert_eq!(first.sub_tasks_killed, 1);

        let second = s.emergency_stop(
            emergency::EmergencyScope::Subtask {
                worker_id: worker,
                sub_task_id: sub,
            },
            "test",
            chrono::Utc::now(),
        );
        assert_eq!(second.sub_tasks_killed, 0);
    }

    #[test]
    fn worker_scope_emergency_stop_cascade() {
        let s = engine();
        let w1 = Uuid::new_v4();
        let w2 = Uuid::new_v4();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let s3 = Uuid::new_v4();

        for (sub, worker) in [(s1, w1), (s2, w1), (s3, w2)] {
            s.register_ancestry(ancestry::AncestryEntry {
                sub_task_id: sub,
                parent_sub_task_id: None,
                worker_id: worker,
                plan_id: None,
                agent_type: "@coder".to_string(),
                prompt_hash: hash_prompt(&format!("task for {sub}")),
            });
        }

        let result = s.emergency_stop(
            emergency::EmergencyScope::Worker { worker_id: w1 },
            "operator abort",
            chrono::Utc::now(),
        );
        assert_eq!(result.sub_tasks_killed, 2);
        let mut ids = result.killed_sub_task_ids.clone();
        ids.sort();
        let mut expected = vec![s1, s2];
        expected.sort();
        assert_eq!(ids, expected);

        // s3 under w2 is untouched.
        assert!(!s.get_ancestry_chain(s3).is_empty());
    }

    #[test]
    fn ancestry_clear_empties_chain() {
        let s = engine();
        let entry = ancestry::AncestryEntry {
            sub_task_id: Uuid::new_v4(),
            parent_sub_task_id: None,
            worker_id: Uuid::new_v4(),
            plan_id: None,
            agent_type: "@tester".to_string(),
            prompt_hash: hash_prompt("write tests"),
        };
        let id = entry.sub_task_id;
        s.register_ancestry(entry);
        assert!(!s.get_ancestry_chain(id).is_empty());
        s.clear_ancestry(id);
        assert!(s.get_ancestry_chain(id).is_empty());
    }

    #[test]
    fn rate_limit_boundary_within_window() {
        let mut config = SafetyLimitsConfig::default();
        config.sub_task_spawn_rate_limit = 3;
        let s = SafetyLimits::new(config);
        let worker = Uuid::new_v4();
        let t0 = std::time::Instant::now();

        for _ in 0..3 {
            s.check_rate_limit(worker, t0).unwrap();
            s.record_spawn(worker, t0);
        }
        // 4th spawn in the same instant rejects.
        assert!(s.check_rate_limit(worker, t0).is_err());
    }

    #[test]
    fn total_and_parallel_limits() {
        let s = engine();
        let worker = Uuid::new_v4();
        assert!(s.check_total_limit(worker, 99).is_ok());
        assert!(s.check_total_limit(worker, 100).is_err());
        assert!(s.check_parallel_limit(worker, 19).is_ok());
        assert!(s.check_parallel_limit(worker, 20).is_err());
    }

    #[test]
    fn cost_aggregation_per_worker() {
        let s = engine();
        let worker = Uuid::new_v4();
        let sub1 = Uuid::new_v4();
        let sub2 = Uuid::new_v4();
        s.register_ancestry(ancestry::AncestryEntry {
            sub_task_id: sub1,
            parent_sub_task_id: None,
            worker_id: worker,
            plan_id: None,
            agent_type: "@coder".to_string(),
            prompt_hash: hash_prompt("a"),
        });
        s.register_ancestry(ancestry::AncestryEntry {
            sub_task_id: sub2,
            parent_sub_task_id: None,
            worker_id: worker,
            plan_id: None,
            agent_type: "@coder".to_string(),
            prompt_hash: hash_prompt("b"),
        });
        s.track_subtask_cost(cost::CostEntry {
            sub_task_id: sub1,
            input_tokens: 1000,
            output_tokens: 500,
            model: "default".to_string(),
            timestamp: chrono::Utc::now(),
        });
        s.track_subtask_cost(cost::CostEntry {
            sub_task_id: sub2,
            input_tokens: 2000,
            output_tokens: 1000,
            model: "default".to_string(),
            timestamp: chrono::Utc::now(),
        });
        let total = s.get_total_cost_for_worker(worker);
        assert!(total > 0.0);
    }

    #[test]
    fn worker_cost_includes_direct_entries_not_just_children() {
        let s = engine();
        let worker = Uuid::new_v4();
        // No ancestry at all for `worker` -- it's a top-level deployed
        // task-worker billed directly, not a spawning parent.
        s.track_subtask_cost(cost::CostEntry {
            sub_task_id: worker,
            input_tokens: 1000,
            output_tokens: 1000,
            model: "default".to_string(),
            timestamp: chrono::Utc::now(),
        });
        assert!(s.get_total_cost_for_worker(worker) > 0.0);
    }
}
