//! Routing decisions and outcome samples (both append-only records)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::backend::{BackendKind, ModelKey};
use crate::task::{Complexity, TaskCategory};

/// A ranked candidate with its final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub key: ModelKey,
    pub score: f64,
}

/// The router's choice for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub id: Uuid,
    pub chosen: ModelKey,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub rationale: String,
    /// Up to three runners-up, best first
    pub alternatives: Vec<ScoredCandidate>,
    pub task_category: TaskCategory,
    pub complexity: Complexity,
    /// Set when no candidate qualified and the emergency backend was used
    pub emergency: bool,
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl RoutingDecision {
    /// The chosen pair followed by the alternatives, in fallback order
    pub fn fallback_order(&self) -> Vec<ModelKey> {
        std::iter::once(self.chosen.clone())
            .chain(self.alternatives.iter().map(|c| c.key.clone()))
            .collect()
    }
}

/// Performance sample from one completed backend call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub backend: BackendKind,
    pub model: String,
    pub task_category: TaskCategory,
    pub complexity: Complexity,
    pub latency_ms: u64,
    pub success: bool,
    pub cost: f64,
    pub tokens_used: u32,
    pub timestamp: DateTime<Utc>,
}

impl Outcome {
    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.backend, self.model.clone())
    }
}
