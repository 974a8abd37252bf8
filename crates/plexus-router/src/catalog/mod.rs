//! Capability catalog
//!
//! The catalog is the router's view of what each (backend, model) pair can do and
//! how it has been performing. It is seeded from [`seed`], filtered to backends
//! that actually have adapters, overlaid with the last persisted snapshot and
//! afterwards mutated only by the learning loop.

pub mod seed;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

use plexus_core::{BackendKind, Complexity, ModelCapability, ModelKey, TaskCategory, TaskRequirements};

use crate::router::{is_eligible, score, ScoringConfig};

/// A ranked catalog entry with qualitative notes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub key: ModelKey,
    pub score: f64,
    pub strengths: Vec<String>,
    pub considerations: Vec<String>,
}

/// Concurrent map of capabilities keyed by (backend, model)
#[derive(Debug, Default)]
pub struct CapabilityCatalog {
    entries: RwLock<BTreeMap<ModelKey, ModelCapability>>,
}

impl CapabilityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in seed table
    pub fn seeded() -> Self {
        Self::from_capabilities(seed::default_capabilities())
    }

    pub fn from_capabilities(capabilities: impl IntoIterator<Item = ModelCapability>) -> Self {
        let entries = capabilities.into_iter().map(|c| (c.key(), c)).collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get(&self, key: &ModelKey) -> Option<ModelCapability> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &ModelKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Owned copy of every entry, in key order
    pub fn snapshot(&self) -> Vec<ModelCapability> {
        self.entries.read().values().cloned().collect()
    }

    /// Entries serving `model` on any backend
    pub fn find_model(&self, model: &str) -> Vec<ModelKey> {
        self.entries
            .read()
            .keys()
            .filter(|k| k.model == model)
            .cloned()
            .collect()
    }

    pub fn insert(&self, capability: ModelCapability) {
        self.entries.write().insert(capability.key(), capability);
    }

    /// Drop entries for backends without a usable adapter; returns how many went
    pub fn retain_backends(&self, enabled: &[BackendKind]) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| enabled.contains(&key.backend));
        before - entries.len()
    }

    /// Merge a persisted snapshot into the catalog.
    ///
    /// Known entries take the persisted learned fields and watermark while keeping
    /// their declared fields. Unknown entries are added when their backend is enabled. Returns the number
    /// of entries touched.
    pub fn overlay(&self, persisted: Vec<ModelCapability>, enabled: &[BackendKind]) -> usize {
        let mut entries = self.entries.write();
        let mut touched = 0;

        for stored in persisted {
            match entries.get_mut(&stored.key()) {
                Some(current) => {
                    current.avg_latency_ms = stored.avg_latency_ms;
                    current.success_rate = stored.success_rate;
                    current.last_updated = stored.last_updated;
                    touched += 1;
                }
                None if enabled.contains(&stored.backend) => {
                    entries.insert(stored.key(), stored);
                    touched += 1;
                }
                None => {}
            }
        }
        touched
    }

    /// Mutate one entry in place; returns false when the key is unknown
    pub fn update<F>(&self, key: &ModelKey, f: F) -> bool
    where
        F: FnOnce(&mut ModelCapability),
    {
        match self.entries.write().get_mut(key) {
            Some(capability) => {
                f(capability);
                true
            }
            None => false,
        }
    }

    /// When `key` last absorbed learned data
    pub fn last_updated(&self, key: &ModelKey) -> Option<DateTime<Utc>> {
        self.entries.read().get(key).map(|c| c.last_updated)
    }

    /// Eligible entries for a category/complexity, best first, with a note on why
    pub fn recommend(
        &self,
        category: TaskCategory,
        complexity: Complexity,
        scoring: &ScoringConfig,
    ) -> Vec<Recommendation> {
        let requirements = TaskRequirements::new(category, complexity);

        let mut ranked: Vec<Recommendation> = self
            .snapshot()
            .iter()
            .filter(|cap| is_eligible(cap, &requirements, 0))
            .map(|cap| {
                let (strengths, considerations) = assess(cap, complexity);
                Recommendation {
                    key: cap.key(),
                    score: score(cap, &requirements, scoring).total,
                    strengths,
                    considerations,
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
        ranked
    }
}

fn assess(cap: &ModelCapability, requested: Complexity) -> (Vec<String>, Vec<String>) {
    let mut strengths = Vec::new();
    let mut considerations = Vec::new();

    if cap.backend.is_local() {
        strengths.push("Runs locally; prompts stay on your infrastructure".to_string());
    } else {
        considerations.push("Cloud-hosted; prompts leave your infrastructure".to_string());
    }

    if cap.cost_per_1k == 0.0 {
        strengths.push("No per-token cost".to_string());
    } else if cap.cost_per_1k < 0.001 {
        strengths.push("Low cost".to_string());
    } else if cap.cost_per_1k > 0.01 {
        considerations.push(format!("Premium pricing (${:.4}/1K tokens)", cap.cost_per_1k));
    }

    if cap.avg_latency_ms < 1500.0 {
        strengths.push(format!("Fast responses (~{:.0}ms)", cap.avg_latency_ms));
    } else if cap.avg_latency_ms > 5000.0 {
        considerations.push(format!("Slow responses (~{:.0}ms)", cap.avg_latency_ms));
    }

    if cap.success_rate >= 0.97 {
        strengths.push(format!("Highly reliable ({:.0}% success)", cap.success_rate * 100.0));
    } else if cap.success_rate < 0.9 {
        considerations.push(format!("Recent failures ({:.0}% success)", cap.success_rate * 100.0));
    }

    if cap.function_calling {
        strengths.push("Supports function calling".to_string());
    } else {
        considerations.push("No function calling".to_string());
    }

    if cap.streaming {
        strengths.push("Supports streaming".to_string());
    }

    if cap.max_complexity > requested {
        strengths.push(format!("Headroom up to {} tasks", cap.max_complexity));
    } else {
        considerations.push("At the top of its complexity range".to_string());
    }

    if !cap.specializations.is_empty() {
        strengths.push(format!("Specialized in {}", cap.specializations.join(", ")));
    }

    (strengths, considerations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_catalog_restricts_to_enabled() {
        let catalog = CapabilityCatalog::seeded();
        let total = catalog.len();
        let removed = catalog.retain_backends(&[BackendKind::Ollama]);

        assert_eq!(catalog.len() + removed, total);
        assert!(catalog.snapshot().iter().all(|c| c.backend == BackendKind::Ollama));
    }

    #[test]
    fn test_overlay_keeps_declared_fields() {
        let catalog = CapabilityCatalog::seeded();
        let key = ModelKey::new(BackendKind::Ollama, "llama3.1:8b");
        let seeded = catalog.get(&key).unwrap();

        let mut stored = seeded.clone().with_performance(800.0, 0.99).with_max_tokens(1);
        stored.last_updated = Utc::now();
        let orphan = ModelCapability::new(BackendKind::Anthropic, "claude-legacy");

        let touched = catalog.overlay(vec![stored, orphan], &[BackendKind::Ollama]);
        assert_eq!(touched, 1);

        let merged = catalog.get(&key).unwrap();
        assert_eq!(merged.avg_latency_ms, 800.0);
        assert_eq!(merged.success_rate, 0.99);
        assert_eq!(merged.max_tokens, seeded.max_tokens);
        assert!(!catalog.contains(&ModelKey::new(BackendKind::Anthropic, "claude-legacy")));
    }

    #[test]
    fn test_recommend_ranks_eligible_entries() {
        let catalog = CapabilityCatalog::seeded();
        let recs = catalog.recommend(TaskCategory::Code, Complexity::Complex, &ScoringConfig::default());

        assert!(!recs.is_empty());
        assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
        for rec in &recs {
            let cap = catalog.get(&rec.key).unwrap();
            assert!(cap.supports(TaskCategory::Code));
            assert!(cap.max_complexity >= Complexity::Complex);
        }
        assert!(!recs.iter().any(|r| r.key.model == "codellama:13b"));
    }

    #[test]
    fn test_recommendation_notes() {
        let catalog = CapabilityCatalog::from_capabilities(vec![ModelCapability::new(
            BackendKind::Ollama,
            "tiny",
        )
        .with_performance(700.0, 0.85)]);
        let recs = catalog.recommend(TaskCategory::General, Complexity::Medium, &ScoringConfig::default());

        let rec = &recs[0];
        assert!(rec.strengths.iter().any(|s| s.starts_with("Runs locally")));
        assert!(rec.strengths.iter().any(|s| s.starts_with("Fast responses")));
        assert!(rec.considerations.iter().any(|s| s.starts_with("Recent failures")));
        assert!(rec.considerations.contains(&"No function calling".to_string()));
    }

    #[test]
    fn test_update_unknown_key() {
        let catalog = CapabilityCatalog::new();
        assert!(!catalog.update(&ModelKey::new(BackendKind::OpenAi, "nope"), |c| c.success_rate = 0.0));
    }
}
