//! Eligibility and weighted scoring of catalog entries

use serde::{Deserialize, Serialize};

use plexus_core::{ModelCapability, TaskRequirements};

/// Neutral value for a factor the request expresses no preference on
const NEUTRAL: f64 = 0.5;
/// Privacy term for cloud backends on privacy-sensitive requests
const CLOUD_PRIVACY: f64 = 0.3;

/// Factor weights; they need not sum to one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub fit: f64,
    pub performance: f64,
    pub cost: f64,
    pub privacy: f64,
    pub specialization: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            fit: 0.30,
            performance: 0.25,
            cost: 0.20,
            privacy: 0.15,
            specialization: 0.10,
        }
    }
}

/// Scoring weights and normalisation ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    /// Latency at or above which the latency half of performance scores 0
    pub latency_ceiling_ms: f64,
    /// Cost per 1K tokens at or above which the cost term scores 0
    pub cost_ceiling_per_1k: f64,
    /// Half-width of the uniform exploration jitter
    pub jitter: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            latency_ceiling_ms: 10_000.0,
            cost_ceiling_per_1k: 0.1,
            jitter: 0.05,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), String> {
        let w = &self.weights;
        let weights = [w.fit, w.performance, w.cost, w.privacy, w.specialization];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("scoring weights must be finite and non-negative".to_string());
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err("at least one scoring weight must be positive".to_string());
        }
        if self.latency_ceiling_ms <= 0.0 || self.cost_ceiling_per_1k <= 0.0 {
            return Err("scoring ceilings must be positive".to_string());
        }
        if !(0.0..=0.5).contains(&self.jitter) {
            return Err("jitter must be within [0, 0.5]".to_string());
        }
        Ok(())
    }
}

/// Per-factor terms (each in [0, 1]) and the weighted total
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub fit: f64,
    pub performance: f64,
    pub cost: f64,
    pub privacy: f64,
    pub specialization: f64,
    pub jitter: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    /// Weighted contribution of each factor, labelled for rationales
    pub fn weighted(&self, weights: &ScoringWeights) -> [(&'static str, f64); 5] {
        [
            ("capability fit", self.fit * weights.fit),
            ("performance", self.performance * weights.performance),
            ("cost", self.cost * weights.cost),
            ("privacy", self.privacy * weights.privacy),
            ("specialization", self.specialization * weights.specialization),
        ]
    }
}

/// Whether `capability` can serve the request at all
pub fn is_eligible(capability: &ModelCapability, requirements: &TaskRequirements, max_tokens: u32) -> bool {
    capability.supports(requirements.category)
        && capability.max_complexity >= requirements.complexity
        && (!requirements.requires_function_calling || capability.function_calling)
        && (!requirements.requires_streaming || capability.streaming)
        && capability.max_tokens >= max_tokens
}

/// Score an eligible capability without exploration jitter
pub fn score(
    capability: &ModelCapability,
    requirements: &TaskRequirements,
    config: &ScoringConfig,
) -> ScoreBreakdown {
    let support = |supported: bool| if supported { 1.0 } else { NEUTRAL };
    let fit = (1.0 + support(capability.function_calling) + support(capability.streaming)) / 3.0;

    let latency = (capability.avg_latency_ms / config.latency_ceiling_ms).min(1.0);
    let performance = (1.0 - latency) * 0.5 + capability.success_rate.clamp(0.0, 1.0) * 0.5;

    let cost = if requirements.cost_priority {
        1.0 - (capability.cost_per_1k / config.cost_ceiling_per_1k).min(1.0)
    } else {
        NEUTRAL
    };

    let privacy = match (requirements.privacy_sensitive, capability.backend.is_local()) {
        (true, true) => 1.0,
        (true, false) => CLOUD_PRIVACY,
        (false, _) => NEUTRAL,
    };

    let specialization = if requirements.specialized_knowledge.is_empty() {
        NEUTRAL
    } else {
        let matched = requirements
            .specialized_knowledge
            .iter()
            .filter(|tag| {
                capability
                    .specializations
                    .iter()
                    .any(|have| have.eq_ignore_ascii_case(tag))
            })
            .count();
        matched as f64 / requirements.specialized_knowledge.len() as f64
    };

    let mut breakdown = ScoreBreakdown {
        fit,
        performance,
        cost,
        privacy,
        specialization,
        jitter: 0.0,
        total: 0.0,
    };
    breakdown.total = breakdown.weighted(&config.weights).iter().map(|(_, v)| v).sum();
    breakdown
}
