//! Depth policy configuration and the sliding rate-limit window.

use std::time::{Duration, Instant};

use crate::identity::SpawnContext;

/// Configurable safety-limits defaults.
///
/// Spec §9 Open Questions: the source disagreed on `max_sub_tasks_per_worker`
/// / `max_parallel_sub_tasks` between its service defaults (100 / 20) and
/// its own test expectations (5 / 10). This implementation adopts the
/// service defaults and makes every field configurable so a caller can
/// tighten them (as the teacher's tests evidently wanted) without forking
/// the engine.
#[derive(Debug, Clone)]
pub struct SafetyLimitsConfig {
    pub max_depth_from_orchestrator: u32,
    pub max_depth_from_agent: u32,
    pub max_sub_tasks_per_worker: usize,
    pub max_parallel_sub_tasks: usize,
    pub sub_task_spawn_rate_limit: usize,
}

impl Default for SafetyLimitsConfig {
    fn default() -> Self {
        Self {
            max_depth_from_orchestrator: 2,
            max_depth_from_agent: 1,
            max_sub_tasks_per_worker: 100,
            max_parallel_sub_tasks: 20,
            sub_task_spawn_rate_limit: 100,
        }
    }
}

impl SafetyLimitsConfig {
    /// The effective maximum depth for a given root spawn context (spec §4.1).
    ///
    /// `Subtask` is not itself a root context -- spec §4.3 step 2 requires
    /// callers to translate a subtask-rooted chain's context to `Agent`
    /// before calling this (unless its root actually is the orchestrator,
    /// in which case the root context passed in is already
    /// `Orchestrator`). This function only needs to know the two genuine
    /// root kinds; `Subtask` falls back to the agent limit defensively.
    pub fn effective_max_depth(&self, context: SpawnContext) -> u32 {
        match context {
            SpawnContext::Orchestrator => self.max_depth_from_orchestrator,
            SpawnContext::Agent | SpawnContext::Subtask => self.max_depth_from_agent,
        }
    }
}

/// A sliding 60-second window of spawn timestamps for one worker.
#[derive(Debug, Default)]
pub struct RateLimitWindow {
    timestamps: Vec<Instant>,
}

impl RateLimitWindow {
    const WINDOW: Duration = Duration::from_secs(60);

    /// Drop timestamps older than 60s relative to `now`.
    pub fn trim(&mut self, now: Instant) {
        self.timestamps
            .retain(|t| now.saturating_duration_since(*t) < Self::WINDOW);
    }

    pub fn count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn push(&mut self, now: Instant) {
        self.timestamps.push(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_depth_policy_matches_spec() {
        let cfg = SafetyLimitsConfig::default();
        assert_eq!(cfg.effective_max_depth(SpawnContext::Orchestrator), 2);
        assert_eq!(cfg.effective_max_depth(SpawnContext::Agent), 1);
    }

    #[test]
    fn window_trims_old_entries() {
        let mut window = RateLimitWindow::default();
        let t0 = Instant::now();
        window.push(t0);
        // 61 seconds later the entry should be trimmed.
        let t1 = t0 + Duration::from_secs(61);
        window.trim(t1);
        assert_eq!(window.count(), 0);
    }

    #[test]
    fn window_keeps_recent_entries() {
        let mut window = RateLimitWindow::default();
        let t0 = Instant::now();
        window.push(t0);
        let t1 = t0 + Duration::from_secs(30);
        window.trim(t1);
        assert_eq!(window.count(), 1);
    }
}
