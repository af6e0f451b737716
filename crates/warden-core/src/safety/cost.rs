//! Per-subtask cost ledger (spec §4.1 "Cost ledger").

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Per-model dollar rate, per 1000 tokens, split input/output.
#[derive(Debug, Clone, Copy)]
pub struct ModelRate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// A recorded cost observation for one subtask (spec §3 `CostEntry`).
#[derive(Debug, Clone)]
pub struct CostEntry {
    pub sub_task_id: Uuid,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

/// Tracks cost entries and computes dollar cost per model via a rate
/// table with a `"default"` fallback, matching spec §4.1's "per-model
/// table (fallback default)".
#[derive(Debug)]
pub struct CostTable {
    rates: HashMap<String, ModelRate>,
    entries: HashMap<Uuid, Vec<CostEntry>>,
}

impl CostTable {
    pub fn new() -> Self {
        let mut rates = HashMap::new();
        rates.insert(
            "default".to_string(),
            ModelRate {
                input_per_1k: 0.003,
                output_per_1k: 0.015,
            },
        );
        Self {
            rates,
            entries: HashMap::new(),
        }
    }

    /// Override or add a per-model rate.
    pub fn set_rate(&mut self, model: impl Into<String>, rate: ModelRate) {
        self.rates.insert(model.into(), rate);
    }

    pub fn record(&mut self, entry: CostEntry) {
        self.entries
            .entry(entry.sub_task_id)
            .or_default()
            .push(entry);
    }

    fn rate_for(&self, model: &str) -> ModelRate {
        self.rates
            .get(model)
            .copied()
            .unwrap_or_else(|| self.rates["default"])
    }

    /// Total dollar cost recorded for a single subtask.
    pub fn cost_for_subtask(&self, sub_task_id: Uuid) -> f64 {
        let Some(entries) = self.entries.get(&sub_task_id) else {
            return 0.0;
        };
        entries
            .iter()
            .map(|e| {
                let rate = self.rate_for(&e.model);
                (e.input_tokens as f64 / 1000.0) * rate.input_per_1k
                    + (e.output_tokens as f64 / 1000.0) * rate.output_per_1k
            })
            .sum()
    }
}

impl Default for CostTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_falls_back_to_default_rate() {
        let mut table = CostTable::new();
        let sub = Uuid::new_v4();
        table.record(CostEntry {
            sub_task_id: sub,
            input_tokens: 1000,
            output_tokens: 0,
            model: "some-unlisted-model".to_string(),
            timestamp: chrono::Utc::now(),
        });
        assert!((table.cost_for_subtask(sub) - 0.003).abs() < 1e-9);
    }

    #[test]
    fn custom_rate_overrides_default() {
        let mut table = CostTable::new();
        table.set_rate(
            "cheap-model",
            ModelRate {
                input_per_1k: 0.0001,
                output_per_1k: 0.0002,
            },
        );
        let sub = Uuid::new_v4();
        table.record(CostEntry {
            sub_task_id: sub,
            input_tokens: 1000,
            output_tokens: 1000,
            model: "cheap-model".to_string(),
            timestamp: chrono::Utc::now(),
        });
        assert!((table.cost_for_subtask(sub) - 0.0003).abs() < 1e-9);
    }

    #[test]
    fn unknown_subtask_costs_zero() {
        let table = CostTable::new();
        assert_eq!(table.cost_for_subtask(Uuid::new_v4()), 0.0);
    }
}
