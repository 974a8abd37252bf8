//! Outcome-driven catalog learning
//!
//! Each pass reads recent outcomes from the store and folds them into the catalog
//! with a per-sample exponential moving average. A capability's `last_updated`
//! acts as a watermark: only outcomes newer than it count, and a key needs at least
//! `min_samples` of them before anything changes. Replaying the same window twice
//! is therefore a no-op.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use plexus_core::{ModelKey, Outcome};
use plexus_persist::RoutingStore;

use crate::catalog::CapabilityCatalog;
use crate::error::RouterError;

/// Learning loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// EMA weight of each new sample
    pub alpha: f64,
    /// Fresh outcomes a key needs before it is updated
    pub min_samples: usize,
    /// How far back each pass reads outcomes
    pub lookback_secs: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            alpha: 0.1,
            min_samples: 5,
            lookback_secs: 3600,
        }
    }
}

/// What one pass changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearningReport {
    /// Outcomes read from the store
    pub outcomes: usize,
    /// Outcomes folded into the catalog
    pub applied: usize,
    pub updated: Vec<ModelKey>,
}

/// Fold fresh outcomes into `catalog`.
///
/// Outcomes for keys missing from the catalog are ignored.
pub fn apply_outcomes(
    catalog: &CapabilityCatalog,
    outcomes: &[Outcome],
    alpha: f64,
    min_samples: usize,
) -> LearningReport {
    let mut by_key: BTreeMap<ModelKey, Vec<&Outcome>> = BTreeMap::new();
    for outcome in outcomes {
        by_key.entry(outcome.key()).or_default().push(outcome);
    }

    let mut report = LearningReport {
        outcomes: outcomes.len(),
        ..Default::default()
    };

    for (key, samples) in by_key {
        let Some(watermark) = catalog.last_updated(&key) else {
            continue;
        };

        let mut fresh: Vec<&Outcome> = samples
            .into_iter()
            .filter(|o| o.timestamp > watermark)
            .collect();
        if fresh.len() < min_samples.max(1) {
            debug!(key = %key, fresh = fresh.len(), "Not enough fresh outcomes to learn from");
            continue;
        }
        fresh.sort_by_key(|o| o.timestamp);

        let newest: DateTime<Utc> = fresh.last().map(|o| o.timestamp).unwrap_or(watermark);
        let applied = fresh.len();
        catalog.update(&key, |cap| {
            for outcome in &fresh {
                cap.record_sample(outcome.latency_ms as f64, outcome.success, alpha);
            }
            cap.last_updated = newest;
        });

        report.applied += applied;
        report.updated.push(key);
    }

    report
}

/// Periodic learner bound to one catalog and store
#[derive(Debug, Clone)]
pub struct Learner {
    config: LearningConfig,
    catalog: Arc<CapabilityCatalog>,
    store: Arc<dyn RoutingStore>,
}

impl Learner {
    pub fn new(config: LearningConfig, catalog: Arc<CapabilityCatalog>, store: Arc<dyn RoutingStore>) -> Self {
        Self {
            config,
            catalog,
            store,
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Replay the lookback window and persist the catalog if anything moved
    pub async fn run_pass(&self) -> Result<LearningReport, RouterError> {
        let since = ChronoDuration::from_std(Duration::from_secs(self.config.lookback_secs))
            .ok()
            .and_then(|lookback| Utc::now().checked_sub_signed(lookback))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let outcomes = self.store.outcomes_since(since).await?;

        let report = apply_outcomes(&self.catalog, &outcomes, self.config.alpha, self.config.min_samples);

        if !report.updated.is_empty() {
            self.store.save_capabilities(&self.catalog.snapshot()).await?;
            info!(
                updated = report.updated.len(),
                applied = report.applied,
                outcomes = report.outcomes,
                "Catalog updated from outcomes"
            );
        } else {
            debug!(outcomes = report.outcomes, "Learning pass made no changes");
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{BackendKind, Complexity, ModelCapability, TaskCategory};
    use plexus_persist::MemoryStore;

    fn outcome(latency_ms: u64, success: bool, at: DateTime<Utc>) -> Outcome {
        Outcome {
            backend: BackendKind::OpenAi,
            model: "gpt-4o".to_string(),
            task_category: TaskCategory::Code,
            complexity: Complexity::Medium,
            latency_ms,
            success,
            cost: 0.001,
            tokens_used: 100,
            timestamp: at,
        }
    }

    fn catalog(watermark: DateTime<Utc>) -> CapabilityCatalog {
        let mut cap = ModelCapability::new(BackendKind::OpenAi, "gpt-4o").with_performance(2000.0, 0.5);
        cap.last_updated = watermark;
        CapabilityCatalog::from_capabilities(vec![cap])
    }

    fn key() -> ModelKey {
        ModelKey::new(BackendKind::OpenAi, "gpt-4o")
    }

    #[test]
    fn test_requires_min_samples() {
        let start = Utc::now();
        let catalog = catalog(start);
        let outcomes: Vec<Outcome> = (1..=4)
            .map(|i| outcome(500, true, start + ChronoDuration::seconds(i)))
            .collect();

        let report = apply_outcomes(&catalog, &outcomes, 0.1, 5);
        assert!(report.updated.is_empty());
        assert_eq!(catalog.get(&key()).unwrap().avg_latency_ms, 2000.0);
    }

    #[test]
    fn test_per_sample_ema_and_watermark() {
        let start = Utc::now();
        let catalog = catalog(start);
        let outcomes: Vec<Outcome> = (1..=5)
            .map(|i| outcome(1000, true, start + ChronoDuration::seconds(i)))
            .collect();

        let report = apply_outcomes(&catalog, &outcomes, 0.1, 5);
        assert_eq!(report.updated, vec![key()]);
        assert_eq!(report.applied, 5);

        let cap = catalog.get(&key()).unwrap();
        let expected = 1000.0 + 1000.0 * 0.9f64.powi(5);
        assert!((cap.avg_latency_ms - expected).abs() < 1e-6);
        assert!(cap.success_rate > 0.5 && cap.success_rate <= 1.0);
        assert_eq!(cap.last_updated, start + ChronoDuration::seconds(5));

        let again = apply_outcomes(&catalog, &outcomes, 0.1, 5);
        assert!(again.updated.is_empty());
        assert_eq!(catalog.get(&key()).unwrap(), cap);
    }

    #[test]
    fn test_stale_outcomes_ignored() {
        let start = Utc::now();
        let catalog = catalog(start);
        let outcomes: Vec<Outcome> = (1..=10)
            .map(|i| outcome(10, false, start - ChronoDuration::seconds(i)))
            .collect();
        assert!(apply_outcomes(&catalog, &outcomes, 0.1, 5).updated.is_empty());
    }

    #[tokio::test]
    async fn test_pass_persists_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let start = Utc::now() - ChronoDuration::minutes(10);
        let catalog = Arc::new(catalog(start));
        for i in 1..=6 {
            store
                .append_outcome(&outcome(800, true, start + ChronoDuration::seconds(i)))
                .await
                .unwrap();
        }

        let learner = Learner::new(LearningConfig::default(), catalog.clone(), store.clone());
        let report = learner.run_pass().await.unwrap();
        assert_eq!(report.updated.len(), 1);

        let persisted = store.load_capabilities().await.unwrap();
        assert_eq!(persisted, catalog.snapshot());

        let second = learner.run_pass().await.unwrap();
        assert!(second.updated.is_empty());
    }
}
