//! Router metrics with Prometheus text export

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use plexus_core::BackendKind;
use plexus_llm::UsageSnapshot;

use crate::cache::CacheStats;
use crate::rate_limit::RateLimitStats;

/// Counters owned by one manager
#[derive(Debug, Default)]
pub struct RouterMetrics {
    requests: AtomicU64,
    routed: AtomicU64,
    emergency_routes: AtomicU64,
    fallbacks: AtomicU64,
    capacity_rejections: AtomicU64,
    backend_failures: AtomicU64,
    exhausted: AtomicU64,
    streams: AtomicU64,
    tokens_used: AtomicU64,
    learning_passes: AtomicU64,
    capability_updates: AtomicU64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a routing decision
    pub fn record_route(&self, emergency: bool) {
        self.routed.fetch_add(1, Ordering::Relaxed);
        if emergency {
            self.emergency_routes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capacity_rejection(&self) {
        self.capacity_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_failure(&self) {
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A request ran out of alternatives
    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream(&self) {
        self.streams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tokens(&self, tokens: u64) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn record_learning_pass(&self, updated: usize) {
        self.learning_passes.fetch_add(1, Ordering::Relaxed);
        self.capability_updates
            .fetch_add(updated as u64, Ordering::Relaxed);
    }

    pub fn counters(&self) -> RouterCounters {
        RouterCounters {
            requests: self.requests.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            emergency_routes: self.emergency_routes.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            backend_failures: self.backend_failures.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            streams: self.streams.load(Ordering::Relaxed),
            tokens_used: self.tokens_used.load(Ordering::Relaxed),
            learning_passes: self.learning_passes.load(Ordering::Relaxed),
            capability_updates: self.capability_updates.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RouterMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RouterCounters {
    pub requests: u64,
    pub routed: u64,
    pub emergency_routes: u64,
    pub fallbacks: u64,
    pub capacity_rejections: u64,
    pub backend_failures: u64,
    pub exhausted: u64,
    pub streams: u64,
    pub tokens_used: u64,
    pub learning_passes: u64,
    pub capability_updates: u64,
}

/// Per-backend view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendMetrics {
    pub backend: BackendKind,
    /// Last known health; `None` until the first check
    pub healthy: Option<bool>,
    pub usage: UsageSnapshot,
    pub rate_limit: Option<RateLimitStats>,
}

/// Everything `Manager::metrics` reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub router: RouterCounters,
    pub backends: Vec<BackendMetrics>,
    pub cache: CacheStats,
    pub catalog_entries: usize,
}

fn family(out: &mut String, name: &str, kind: &str, help: &str) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} {kind}\n"));
}

impl MetricsSnapshot {
    /// Export in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        let r = &self.router;

        let counters = [
            ("plexus_requests_total", "Requests received by the manager", r.requests),
            ("plexus_routed_total", "Routing decisions made", r.routed),
            ("plexus_emergency_routes_total", "Decisions that fell back to the emergency backend", r.emergency_routes),
            ("plexus_fallbacks_total", "Backend attempts beyond the first choice", r.fallbacks),
            ("plexus_capacity_rejections_total", "Calls refused by the rate limiter", r.capacity_rejections),
            ("plexus_backend_failures_total", "Failed backend calls", r.backend_failures),
            ("plexus_exhausted_total", "Requests that failed on every alternative", r.exhausted),
            ("plexus_streams_total", "Streams opened", r.streams),
            ("plexus_tokens_used_total", "Tokens consumed by completed calls", r.tokens_used),
            ("plexus_learning_passes_total", "Learning passes run", r.learning_passes),
            ("plexus_capability_updates_total", "Catalog entries updated by learning", r.capability_updates),
            ("plexus_cache_hits_total", "Response cache hits", self.cache.hits),
            ("plexus_cache_misses_total", "Response cache misses", self.cache.misses),
        ];
        for (name, help, value) in counters {
            family(&mut output, name, "counter", help);
            output.push_str(&format!("{name} {value}\n"));
        }

        family(&mut output, "plexus_cache_entries", "gauge", "Responses currently cached");
        output.push_str(&format!("plexus_cache_entries {}\n", self.cache.entries));

        family(&mut output, "plexus_catalog_entries", "gauge", "Capabilities in the catalog");
        output.push_str(&format!("plexus_catalog_entries {}\n", self.catalog_entries));

        if self.backends.is_empty() {
            return output;
        }

        family(&mut output, "plexus_backend_requests_total", "counter", "Calls made per backend");
        for b in &self.backends {
            output.push_str(&format!(
                "plexus_backend_requests_total{{backend=\"{}\"}} {}\n",
                b.backend, b.usage.requests
            ));
        }

        family(&mut output, "plexus_backend_errors_total", "counter", "Failed calls per backend");
        for b in &self.backends {
            output.push_str(&format!(
                "plexus_backend_errors_total{{backend=\"{}\"}} {}\n",
                b.backend, b.usage.errors
            ));
        }

        family(&mut output, "plexus_backend_cost_usd_total", "counter", "Accumulated cost per backend");
        for b in &self.backends {
            output.push_str(&format!(
                "plexus_backend_cost_usd_total{{backend=\"{}\"}} {:.6}\n",
                b.backend, b.usage.total_cost
            ));
        }

        family(&mut output, "plexus_backend_up", "gauge", "Last health check result (1 healthy)");
        for b in self.backends.iter().filter(|b| b.healthy.is_some()) {
            output.push_str(&format!(
                "plexus_backend_up{{backend=\"{}\"}} {}\n",
                b.backend,
                u8::from(b.healthy == Some(true))
            ));
        }

        family(&mut output, "plexus_rate_limit_used", "gauge", "Admissions in the current window");
        for b in &self.backends {
            if let Some(limit) = &b.rate_limit {
                output.push_str(&format!(
                    "plexus_rate_limit_used{{backend=\"{}\",limit=\"{}\"}} {}\n",
                    b.backend, limit.requests_limit, limit.requests_used
                ));
            }
        }

        output
    }
}
