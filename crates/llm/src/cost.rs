//! Cost Calculator
//!
//! Converts token usage into dollars using a per-model pricing table.

use std::collections::HashMap;

use crate::types::UsageStats;

/// Pricing entry in microdollars per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPricing {
    pub input_per_million: u64,
    pub output_per_million: u64,
}

impl ModelPricing {
    pub const fn new(input_per_million: u64, output_per_million: u64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost in microdollars for the given token counts.
    pub fn cost_micros(&self, usage: &UsageStats) -> u64 {
        (u64::from(usage.input_tokens) * self.input_per_million
            + u64::from(usage.output_tokens) * self.output_per_million)
            / 1_000_000
    }
}

/// Default pricing for common chat models (microdollars per million tokens)
fn default_pricing() -> Vec<(&'static str, ModelPricing)> {
    vec![
        ("gpt-4o", ModelPricing::new(2_500_000, 10_000_000)),
        ("gpt-4o-mini", ModelPricing::new(150_000, 600_000)),
        ("gpt-4.1", ModelPricing::new(2_000_000, 8_000_000)),
        ("gpt-4.1-mini", ModelPricing::new(400_000, 1_600_000)),
        ("gpt-4.1-nano", ModelPricing::new(100_000, 400_000)),
        ("gpt-4-turbo", ModelPricing::new(10_000_000, 30_000_000)),
        ("gpt-4", ModelPricing::new(30_000_000, 60_000_000)),
        ("gpt-3.5-turbo", ModelPricing::new(500_000, 1_500_000)),
        ("o1", ModelPricing::new(15_000_000, 60_000_000)),
        ("o3-mini", ModelPricing::new(1_100_000, 4_400_000)),
        ("o4-mini", ModelPricing::new(1_100_000, 4_400_000)),
        ("deepseek-chat", ModelPricing::new(270_000, 1_100_000)),
        ("deepseek-reasoner", ModelPricing::new(550_000, 2_190_000)),
    ]
}

#[derive(Debug, Clone)]
pub struct CostCalculator {
    pricing: HashMap<String, ModelPricing>,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl CostCalculator {
    pub fn new() -> Self {
        let pricing = default_pricing()
            .into_iter()
            .map(|(model, p)| (model.to_string(), p))
            .collect();
        Self { pricing }
    }

    /// Override or add pricing for a model.
    pub fn set_pricing(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.pricing.insert(model.into(), pricing);
    }

    /// Exact match first, then the longest table entry that prefixes the
    /// model name (dated snapshots such as `gpt-4o-2024-08-06`).
    pub fn get_pricing(&self, model: &str) -> Option<ModelPricing> {
        let model = model.to_lowercase();
        if let Some(p) = self.pricing.get(&model) {
            return Some(*p);
        }
        self.pricing
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, p)| *p)
    }

    /// Cost in dollars; unknown models are free.
    pub fn cost_usd(&self, model: &str, usage: &UsageStats) -> f64 {
        match self.get_pricing(model) {
            Some(p) => p.cost_micros(usage) as f64 / 1_000_000.0,
            None => {
                tracing::debug!("[oracle:cost] no pricing for model {}", model);
                0.0
            }
        }
    }
}
