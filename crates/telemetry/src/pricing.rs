//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price. Custom pricing can be added at runtime via TOML config.
//! The table is advisory: it exists to put an approximate cost on each
//! turn, not to bill anyone.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Round a dollar amount to six decimal places.
pub fn round_cost(cost: f64) -> f64 {
    (cost * 1_000_000.0).round() / 1_000_000.0
}

/// Thread-safe pricing table with built-in defaults and custom overrides.
///
/// Keys are bare model names (`gpt-4o`, not `openai/gpt-4o`).
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let defaults: &[(&str, f64, f64)] = &[
            // ── OpenAI ─────────────────────────────────────────────
            ("gpt-5", 50.0, 100.0),
            ("gpt-4", 30.0, 60.0),
            ("gpt-4-turbo", 10.0, 30.0),
            ("gpt-4o", 2.5, 10.0),
            ("gpt-4o-mini", 0.15, 0.6),
            ("gpt-3.5-turbo", 0.5, 1.5),
            ("o1", 15.0, 60.0),
            ("o3-mini", 1.1, 4.4),
            // ── Anthropic ──────────────────────────────────────────
            ("claude-opus-4", 15.0, 75.0),
            ("claude-sonnet-4", 3.0, 15.0),
            ("claude-3-5-sonnet", 3.0, 15.0),
            ("claude-3-5-haiku", 0.8, 4.0),
            ("claude-3-haiku", 0.25, 1.25),
            // ── Google ─────────────────────────────────────────────
            ("gemini-2.0-flash", 0.1, 0.4),
            ("gemini-1.5-pro", 1.25, 5.0),
            ("gemini-1.5-flash", 0.075, 0.3),
        ];

        let prices = defaults
            .iter()
            .map(|(name, input, output)| (name.to_string(), ModelPricing::new(*input, *output)))
            .collect();

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Built-in defaults plus overrides (model name → pricing).
    pub fn with_overrides<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, ModelPricing)>,
    {
        let table = Self::with_defaults();
        for (model, pricing) in overrides {
            table.set(model, pricing);
        }
        table
    }

    /// Exact lookup.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.read().get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.insert(model.into(), pricing);
    }

    /// Resolve the pricing entry that applies to `model`.
    ///
    /// Tries an exact match, then the name without a provider prefix
    /// (`openai/gpt-4o` → `gpt-4o`), then the longest table key that is a
    /// prefix of the bare name (`gpt-4o-mini-2024-07-18` → `gpt-4o-mini`).
    pub fn resolve(&self, model: &str) -> Option<(String, ModelPricing)> {
        let prices = self.read();

        if let Some(p) = prices.get(model) {
            return Some((model.to_string(), *p));
        }

        let lower = model.to_lowercase();
        let bare = lower.rsplit('/').next().unwrap_or(&lower);
        if let Some(p) = prices.get(bare) {
            return Some((bare.to_string(), *p));
        }

        prices
            .iter()
            .filter(|(key, _)| bare.starts_with(&key.to_lowercase()))
            .max_by_key(|(key, _)| key.len())
            .map(|(key, p)| (key.clone(), *p))
    }

    /// Cost of a call in USD, rounded to six decimals. Unknown models cost 0.
    pub fn compute_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.resolve(model)
            .map(|(_, p)| round_cost(p.cost(input_tokens, output_tokens)))
            .unwrap_or(0.0)
    }

    /// All entries, sorted by model name.
    pub fn entries(&self) -> Vec<(String, ModelPricing)> {
        let mut entries: Vec<_> = self.read().iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ModelPricing>> {
        self.prices.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
