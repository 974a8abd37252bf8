//! Capability-aware routing
//!
//! Filters the catalog down to entries that can serve a request, scores them with
//! [`ScoringConfig`] weights and returns a [`RoutingDecision`] with ranked
//! alternatives and a human-readable rationale.

mod scoring;

pub use scoring::{is_eligible, score, ScoreBreakdown, ScoringConfig, ScoringWeights};

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use plexus_core::{BackendKind, ModelKey, RoutingDecision, ScoredCandidate, TaskRequirements};
use plexus_llm::Request;
use plexus_persist::RoutingStore;

use crate::catalog::CapabilityCatalog;
use crate::error::RouterError;

/// How many runners-up a decision carries
pub const MAX_ALTERNATIVES: usize = 3;
/// Confidence reported for emergency decisions
pub const EMERGENCY_CONFIDENCE: f64 = 0.1;

/// Router configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Add uniform jitter to scores so close runners-up get traffic
    pub exploration: bool,
    pub scoring: ScoringConfig,
    /// Backend used when nothing in the catalog is eligible
    pub emergency_backend: BackendKind,
    pub emergency_model: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            exploration: false,
            scoring: ScoringConfig::default(),
            emergency_backend: BackendKind::Ollama,
            emergency_model: "llama3.1:8b".to_string(),
        }
    }
}

impl RouterConfig {
    pub fn emergency_key(&self) -> ModelKey {
        ModelKey::new(self.emergency_backend, self.emergency_model.clone())
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    key: ModelKey,
    local: bool,
    breakdown: ScoreBreakdown,
}

/// Scores catalog entries and records every decision it makes
#[derive(Debug, Clone)]
pub struct Router {
    catalog: Arc<CapabilityCatalog>,
    store: Option<Arc<dyn RoutingStore>>,
    config: RouterConfig,
}

impl Router {
    pub fn new(catalog: Arc<CapabilityCatalog>, config: RouterConfig) -> Self {
        Self {
            catalog,
            store: None,
            config,
        }
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn catalog(&self) -> &Arc<CapabilityCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Choose a backend, falling back to the emergency pair when nothing qualifies.
    ///
    /// Never fails: store errors are logged and an empty eligible set becomes an
    /// emergency decision.
    pub async fn route(&self, request: &Request, requirements: &TaskRequirements) -> RoutingDecision {
        let decision = match self.select(request, requirements) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, emergency = %self.config.emergency_key(), "Routing degraded to emergency backend");
                self.emergency_decision(request, requirements)
            }
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.append_decision(&decision).await {
                warn!(decision_id = %decision.id, error = %e, "Failed to persist routing decision");
            }
        }

        decision
    }

    /// Pure selection over the current catalog snapshot; nothing is persisted
    pub fn select(&self, request: &Request, requirements: &TaskRequirements) -> Result<RoutingDecision, RouterError> {
        let max_tokens = requirements
            .max_tokens
            .map_or(request.params.max_tokens, |ceiling| ceiling.max(request.params.max_tokens));
        let scoring = &self.config.scoring;

        let mut candidates: Vec<Candidate> = self
            .catalog
            .snapshot()
            .iter()
            .filter(|cap| is_eligible(cap, requirements, max_tokens))
            .map(|cap| Candidate {
                key: cap.key(),
                local: cap.backend.is_local(),
                breakdown: score(cap, requirements, scoring),
            })
            .collect();

        if candidates.is_empty() {
            return Err(RouterError::NoEligibleBackend {
                category: requirements.category,
                complexity: requirements.complexity,
            });
        }

        if self.config.exploration && scoring.jitter > 0.0 {
            let mut rng = rand::rng();
            for candidate in &mut candidates {
                let jitter = rng.random_range(-scoring.jitter..=scoring.jitter);
                candidate.breakdown.jitter = jitter;
                candidate.breakdown.total += jitter;
            }
        }

        candidates.sort_by(|a, b| {
            b.breakdown
                .total
                .total_cmp(&a.breakdown.total)
                .then_with(|| a.key.cmp(&b.key))
        });

        let winner = &candidates[0];
        let runner_up = candidates.get(1);
        let confidence = winner.breakdown.total.clamp(0.0, 1.0);
        let alternatives: Vec<ScoredCandidate> = candidates
            .iter()
            .skip(1)
            .take(MAX_ALTERNATIVES)
            .map(|c| ScoredCandidate {
                key: c.key.clone(),
                score: c.breakdown.total,
            })
            .collect();

        let dominant = self.dominant_factor(winner, runner_up);
        let rationale = rationale(winner, confidence, dominant, &alternatives, requirements);

        let mut metadata = HashMap::new();
        metadata.insert("request_id".to_string(), json!(request.id));
        metadata.insert("candidates".to_string(), json!(candidates.len()));
        metadata.insert("exploration".to_string(), json!(self.config.exploration));
        metadata.insert("dominant_factor".to_string(), json!(dominant));
        metadata.insert("scores".to_string(), json!(winner.breakdown));
        if requirements.speed_priority {
            metadata.insert("speed_priority".to_string(), json!(true));
        }
        if requirements.quality_priority {
            metadata.insert("quality_priority".to_string(), json!(true));
        }

        debug!(
            chosen = %winner.key,
            confidence,
            candidates = candidates.len(),
            category = %requirements.category,
            complexity = %requirements.complexity,
            "Routing decision made"
        );

        Ok(RoutingDecision {
            id: uuid::Uuid::new_v4(),
            chosen: winner.key.clone(),
            confidence,
            rationale,
            alternatives,
            task_category: requirements.category,
            complexity: requirements.complexity,
            emergency: false,
            metadata,
            timestamp: Utc::now(),
        })
    }

    /// Low-confidence decision for the configured emergency pair
    pub fn emergency_decision(&self, request: &Request, requirements: &TaskRequirements) -> RoutingDecision {
        let chosen = self.config.emergency_key();
        let rationale = format!(
            "No catalog entry can serve {} at {} complexity; using emergency backend {} on a degraded path (confidence {:.2}).",
            requirements.category, requirements.complexity, chosen, EMERGENCY_CONFIDENCE
        );

        let mut metadata = HashMap::new();
        metadata.insert("request_id".to_string(), json!(request.id));
        metadata.insert("candidates".to_string(), json!(0));
        metadata.insert("degraded".to_string(), json!(true));

        RoutingDecision {
            id: uuid::Uuid::new_v4(),
            chosen,
            confidence: EMERGENCY_CONFIDENCE,
            rationale,
            alternatives: Vec::new(),
            task_category: requirements.category,
            complexity: requirements.complexity,
            emergency: true,
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Factor with the largest weighted margin over the runner-up
    fn dominant_factor(&self, winner: &Candidate, runner_up: Option<&Candidate>) -> &'static str {
        let weights = &self.config.scoring.weights;
        let ours = winner.breakdown.weighted(weights);
        let theirs = runner_up.map(|c| c.breakdown.weighted(weights));

        let margins = ours.iter().enumerate().map(|(i, (name, value))| {
            let margin = match &theirs {
                Some(other) => value - other[i].1,
                None => *value,
            };
            (*name, margin)
        });

        margins
            .fold(None, |best: Option<(&'static str, f64)>, (name, margin)| match best {
                Some((_, top)) if top >= margin => best,
                _ => Some((name, margin)),
            })
            .map(|(name, _)| name)
            .unwrap_or("capability fit")
    }
}

fn rationale(
    winner: &Candidate,
    confidence: f64,
    dominant: &str,
    alternatives: &[ScoredCandidate],
    requirements: &TaskRequirements,
) -> String {
    let mut text = format!(
        "Selected {} (confidence {:.2}); strongest on {}.",
        winner.key, confidence, dominant
    );

    if requirements.privacy_sensitive {
        if winner.local {
            text.push_str(" Privacy-sensitive request kept on a local backend.");
        } else {
            text.push_str(" Privacy-sensitive request, but no local backend outranked the cloud choice.");
        }
    }

    if alternatives.is_empty() {
        text.push_str(" No alternatives qualified.");
    } else {
        let names: Vec<String> = alternatives
            .iter()
            .map(|a| format!("{} ({:.2})", a.key, a.score))
            .collect();
        text.push_str(&format!(" Alternatives: {}.", names.join(", ")));
    }
    text
}

/// Builder for Router
#[derive(Debug, Default)]
pub struct RouterBuilder {
    catalog: Option<Arc<CapabilityCatalog>>,
    store: Option<Arc<dyn RoutingStore>>,
    config: RouterConfig,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(mut self, catalog: Arc<CapabilityCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn store(mut self, store: Arc<dyn RoutingStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn exploration(mut self, enabled: bool) -> Self {
        self.config.exploration = enabled;
        self
    }

    pub fn scoring(mut self, scoring: ScoringConfig) -> Self {
        self.config.scoring = scoring;
        self
    }

    pub fn emergency(mut self, backend: BackendKind, model: &str) -> Self {
        self.config.emergency_backend = backend;
        self.config.emergency_model = model.to_string();
        self
    }

    pub fn build(self) -> Router {
        Router {
            catalog: self
                .catalog
                .unwrap_or_else(|| Arc::new(CapabilityCatalog::seeded())),
            store: self.store,
            config: self.config,
        }
    }
}
