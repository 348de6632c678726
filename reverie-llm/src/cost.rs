//! Token and cost accounting.
//!
//! One [`CostTracker`] is shared by `Arc` between every service that should
//! be billed together. Model names are matched against the pricing table by
//! prefix, so dated variants (`gpt-4-0613`) bill as their base model.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;

/// Price per 1 000 tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// USD per 1k prompt tokens.
    pub input_per_1k: f64,
    /// USD per 1k completion tokens.
    pub output_per_1k: f64,
}

/// Default pricing table, matched in order.
pub const DEFAULT_PRICING: &[(&str, ModelPricing)] = &[
    (
        "gpt-3.5-turbo",
        ModelPricing {
            input_per_1k: 0.0015,
            output_per_1k: 0.002,
        },
    ),
    (
        "gpt-4",
        ModelPricing {
            input_per_1k: 0.03,
            output_per_1k: 0.06,
        },
    ),
    (
        "text-embedding-ada-002",
        ModelPricing {
            input_per_1k: 0.0001,
            output_per_1k: 0.0,
        },
    ),
];

/// Accumulated usage for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModelUsage {
    /// Prompt tokens.
    pub prompt_tokens: u64,
    /// Completion tokens.
    pub completion_tokens: u64,
    /// USD.
    pub cost: f64,
}

/// Point-in-time totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostReport {
    /// Prompt plus completion tokens across all models.
    pub total_tokens: u64,
    /// USD across all models.
    pub total_cost: f64,
    /// Per-model usage.
    pub breakdown: BTreeMap<String, ModelUsage>,
}

/// Thread-safe usage accumulator.
#[derive(Debug)]
pub struct CostTracker {
    pricing: Vec<(String, ModelPricing)>,
    state: Mutex<CostReport>,
}

impl CostTracker {
    /// A tracker using [`DEFAULT_PRICING`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_pricing(
            DEFAULT_PRICING
                .iter()
                .map(|(prefix, price)| ((*prefix).to_string(), *price)),
        )
    }

    /// A tracker with a custom pricing table, matched in iteration order.
    #[must_use]
    pub fn with_pricing<I: IntoIterator<Item = (String, ModelPricing)>>(pricing: I) -> Self {
        Self {
            pricing: pricing.into_iter().collect(),
            state: Mutex::new(CostReport::default()),
        }
    }

    /// Price for `model`, if any table entry is a prefix of it.
    #[must_use]
    pub fn pricing_for(&self, model: &str) -> Option<ModelPricing> {
        self.pricing
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix.as_str()))
            .map(|(_, price)| *price)
    }

    /// Record one call's usage. Unpriced models are counted at zero cost.
    pub fn record(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) {
        let cost = self.pricing_for(model).map_or(0.0, |p| {
            f64::from(prompt_tokens) / 1000.0 * p.input_per_1k
                + f64::from(completion_tokens) / 1000.0 * p.output_per_1k
        });
        let mut state = self.state.lock();
        state.total_tokens += u64::from(prompt_tokens) + u64::from(completion_tokens);
        state.total_cost += cost;
        let usage = state.breakdown.entry(model.to_string()).or_default();
        usage.prompt_tokens += u64::from(prompt_tokens);
        usage.completion_tokens += u64::from(completion_tokens);
        usage.cost += cost;
    }

    /// Snapshot of the totals, with the total cost rounded to 4 decimals.
    #[must_use]
    pub fn report(&self) -> CostReport {
        let mut report = self.state.lock().clone();
        report.total_cost = (report.total_cost * 10_000.0).round() / 10_000.0;
        report
    }

    /// Zero everything.
    pub fn reset(&self) {
        *self.state.lock() = CostReport::default();
    }
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn prefix_pricing_and_totals() {
        let tracker = CostTracker::new();
        tracker.record("gpt-4-0613", 1000, 500);
        tracker.record("text-embedding-ada-002", 2000, 0);
        tracker.record("llama3", 10, 10);

        let report = tracker.report();
        assert_eq!(report.total_tokens, 1000 + 500 + 2000 + 20);
        // 0.03 + 0.03 + 0.0002
        assert!((report.total_cost - 0.0602).abs() < 1e-9);
        assert_eq!(report.breakdown["llama3"].cost, 0.0);
        assert_eq!(report.breakdown["gpt-4-0613"].completion_tokens, 500);
    }

    #[test]
    fn reset_clears_everything() {
        let tracker = CostTracker::new();
        tracker.record("gpt-3.5-turbo", 100, 100);
        tracker.reset();
        assert_eq!(tracker.report(), CostReport::default());
    }

    #[test]
    fn shared_across_threads() {
        let tracker = Arc::new(CostTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record("gpt-3.5-turbo", 1, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(tracker.report().total_tokens, 800);
    }
}
