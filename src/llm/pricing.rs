//! Fixed per-model price table (USD per 1M tokens).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::round_to;

pub const SONNET: &str = "claude-3-5-sonnet-20241022";
pub const HAIKU: &str = "claude-3-haiku-20240307";
pub const GEMINI_FLASH: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }
}

/// Unknown models are billed at Sonnet rates.
const FALLBACK: ModelPrice = ModelPrice::new(3.0, 15.0);

#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
    fallback: ModelPrice,
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut prices = HashMap::new();
        prices.insert(SONNET.to_string(), ModelPrice::new(3.0, 15.0));
        prices.insert(HAIKU.to_string(), ModelPrice::new(0.25, 1.25));
        prices.insert(GEMINI_FLASH.to_string(), ModelPrice::new(1.25, 5.0));
        Self {
            prices,
            fallback: FALLBACK,
        }
    }
}

impl PriceTable {
    /// Defaults plus `overrides` (override wins on the same model name).
    pub fn with_overrides(overrides: &HashMap<String, ModelPrice>) -> Self {
        let mut table = Self::default();
        for (model, price) in overrides {
            table.prices.insert(model.clone(), *price);
        }
        table
    }

    pub fn price_for(&self, model: &str) -> ModelPrice {
        self.prices.get(model).copied().unwrap_or(self.fallback)
    }

    /// Cost in USD, rounded to 4 decimals.
    pub fn cost(&self, model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
        let p = self.price_for(model);
        let raw = (tokens_in as f64 / 1_000_000.0) * p.input_per_million
            + (tokens_out as f64 / 1_000_000.0) * p.output_per_million;
        round_to(raw, 4)
    }
}

/// Rough token estimate for providers that report no usage: ceil(chars / 4).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
