//! Model capabilities - declared and learned facts about a (backend, model) pair

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{BackendKind, ModelKey};
use crate::task::{Complexity, TaskCategory};

/// Exponential moving average step.
///
/// `alpha` is clamped to [0, 1]; `alpha = 1` replaces the old value outright.
pub fn ema(old: f64, sample: f64, alpha: f64) -> f64 {
    let alpha = alpha.clamp(0.0, 1.0);
    old + alpha * (sample - old)
}

/// Suitability and performance data for one model served by one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapability {
    pub backend: BackendKind,
    pub model: String,
    /// Task categories this model is suited for
    pub task_categories: Vec<TaskCategory>,
    /// Highest complexity tier this model handles well
    pub max_complexity: Complexity,
    pub function_calling: bool,
    pub streaming: bool,
    /// Context/token ceiling
    pub max_tokens: u32,
    /// Blended cost in USD per 1K tokens
    pub cost_per_1k: f64,
    /// Rolling average latency in milliseconds (learned)
    pub avg_latency_ms: f64,
    /// Rolling success rate in [0, 1] (learned)
    pub success_rate: f64,
    /// Specialized-knowledge tags (e.g. "rust", "legal", "security")
    #[serde(default)]
    pub specializations: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl ModelCapability {
    /// Create a capability with neutral performance estimates
    pub fn new(backend: BackendKind, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            task_categories: vec![TaskCategory::General],
            max_complexity: Complexity::Medium,
            function_calling: false,
            streaming: true,
            max_tokens: 4096,
            cost_per_1k: 0.0,
            avg_latency_ms: 2000.0,
            success_rate: 0.95,
            specializations: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.backend, self.model.clone())
    }

    pub fn supports(&self, category: TaskCategory) -> bool {
        self.task_categories.contains(&category)
    }

    pub fn with_categories(mut self, categories: &[TaskCategory]) -> Self {
        self.task_categories = categories.to_vec();
        self
    }

    pub fn with_max_complexity(mut self, complexity: Complexity) -> Self {
        self.max_complexity = complexity;
        self
    }

    pub fn with_function_calling(mut self, enabled: bool) -> Self {
        self.function_calling = enabled;
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.streaming = enabled;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_cost(mut self, cost_per_1k: f64) -> Self {
        self.cost_per_1k = cost_per_1k.max(0.0);
        self
    }

    pub fn with_performance(mut self, avg_latency_ms: f64, success_rate: f64) -> Self {
        self.avg_latency_ms = avg_latency_ms.max(0.0);
        self.success_rate = success_rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_specializations(mut self, tags: &[&str]) -> Self {
        self.specializations = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Fold one observed sample into the rolling averages.
    ///
    /// Latency stays in [0, ∞) and success rate in [0, 1] regardless of input.
    pub fn record_sample(&mut self, latency_ms: f64, success: bool, alpha: f64) {
        let latency = if latency_ms.is_finite() { latency_ms.max(0.0) } else { self.avg_latency_ms };
        self.avg_latency_ms = ema(self.avg_latency_ms, latency, alpha).max(0.0);
        let hit = if success { 1.0 } else { 0.0 };
        self.success_rate = ema(self.success_rate, hit, alpha).clamp(0.0, 1.0);
    }
}
