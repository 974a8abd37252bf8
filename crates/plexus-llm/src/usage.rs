//! Per-adapter usage counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::provider::{LlmError, Response};

/// Cost is accumulated in micro-dollars so it fits an atomic integer
const MICROS_PER_USD: f64 = 1_000_000.0;

/// Lock-free counters owned by one adapter
#[derive(Debug, Default)]
pub struct UsageCounters {
    requests: AtomicU64,
    errors: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    cost_micros: AtomicU64,
}

impl UsageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful call
    pub fn record_success(&self, response: &Response) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.prompt_tokens
            .fetch_add(response.usage.prompt_tokens as u64, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(response.usage.completion_tokens as u64, Ordering::Relaxed);
        let micros = (response.cost.max(0.0) * MICROS_PER_USD).round() as u64;
        self.cost_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Record a failed call
    pub fn record_error(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a streamed call; token counts are not known up front
    pub fn record_stream_opened(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record either outcome of a call
    pub fn observe(&self, result: &Result<Response, LlmError>) {
        match result {
            Ok(response) => self.record_success(response),
            Err(_) => self.record_error(),
        }
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_cost: self.cost_micros.load(Ordering::Relaxed) as f64 / MICROS_PER_USD,
        }
    }
}

/// Snapshot of adapter usage at a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost: f64,
}

impl UsageSnapshot {
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.requests as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FinishReason, Usage};
    use plexus_core::BackendKind;

    fn response(prompt: u32, completion: u32, cost: f64) -> Response {
        Response {
            content: "ok".to_string(),
            backend: BackendKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            usage: Usage::new(prompt, completion),
            cost,
            latency_ms: 10,
            created_at: chrono::Utc::now(),
            request_id: uuid::Uuid::new_v4(),
            function_calls: vec![],
            finish_reason: FinishReason::Stop,
        }
    }

    #[test]
    fn test_usage_counters() {
        let counters = UsageCounters::new();
        counters.observe(&Ok(response(100, 50, 0.002)));
        counters.observe(&Ok(response(10, 5, 0.0005)));
        counters.observe(&Err(LlmError::RateLimited));

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.requests, 3);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.prompt_tokens, 110);
        assert_eq!(snapshot.completion_tokens, 55);
        assert!((snapshot.total_cost - 0.0025).abs() < 1e-9);
        assert!((snapshot.error_rate() - 1.0 / 3.0).abs() < 1e-9);
    }
}
