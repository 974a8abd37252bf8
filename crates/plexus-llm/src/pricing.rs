//! Backend-specific cost tables

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use plexus_core::BackendKind;

use crate::provider::Usage;

/// USD per 1K tokens for one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelRate {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Simple input/output average, used as the catalog's blended rate
    pub fn blended(&self) -> f64 {
        (self.input_per_1k + self.output_per_1k) / 2.0
    }
}

/// Rates keyed by model name.
///
/// Lookups try an exact match first, then the longest rate key that prefixes the
/// model name, so dated snapshots (`gpt-4o-2024-08-06`) price like their family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostTable {
    rates: HashMap<String, ModelRate>,
}

impl CostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in list prices for a backend; local backends are free
    pub fn defaults_for(kind: BackendKind) -> Self {
        let table = Self::new();
        match kind {
            BackendKind::OpenAi => table
                .with_rate("gpt-4o", 0.0025, 0.01)
                .with_rate("gpt-4o-mini", 0.00015, 0.0006)
                .with_rate("gpt-4-turbo", 0.01, 0.03)
                .with_rate("o1", 0.015, 0.06)
                .with_rate("o1-mini", 0.003, 0.012),
            BackendKind::Anthropic => table
                .with_rate("claude-3-5-sonnet", 0.003, 0.015)
                .with_rate("claude-3-5-haiku", 0.0008, 0.004)
                .with_rate("claude-3-opus", 0.015, 0.075)
                .with_rate("claude-3-haiku", 0.00025, 0.00125),
            BackendKind::Ollama => table,
        }
    }

    pub fn with_rate(mut self, model: &str, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.rates
            .insert(model.to_string(), ModelRate::new(input_per_1k, output_per_1k));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn rate(&self, model: &str) -> Option<ModelRate> {
        if let Some(rate) = self.rates.get(model) {
            return Some(*rate);
        }
        self.rates
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, rate)| *rate)
    }

    /// Cost of one call in USD; unknown models cost nothing
    pub fn cost(&self, model: &str, usage: &Usage) -> f64 {
        match self.rate(model) {
            Some(rate) => {
                usage.prompt_tokens as f64 / 1000.0 * rate.input_per_1k
                    + usage.completion_tokens as f64 / 1000.0 * rate.output_per_1k
            }
            None => 0.0,
        }
    }
}
