//! Response caching for non-streaming generation
//!
//! Keys are the SHA-256 of the fields that determine a completion: system prompt,
//! prompt, pinned backend and model (`auto` when routed), max tokens, temperature
//! and top-p.
//! Streaming requests and function calls are never cached.

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use plexus_llm::{Request, Response};

/// Cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Time-to-live for each entry
    pub ttl_secs: u64,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_entries: 10_000,
        }
    }
}

/// Hit/miss counters and current size
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Calculate cache key from request.
///
/// Every variable-length field is length-prefixed so no two distinct requests can
/// share a preimage. The pinned backend and model are separate fields; an unpinned
/// request hashes as `auto`.
pub fn cache_key(request: &Request) -> String {
    let backend = request.backend.map_or("auto", |kind| kind.as_str());
    let model = request.model.as_deref().unwrap_or("");

    let mut hasher = Sha256::new();
    for field in [
        request.system.as_deref().unwrap_or(""),
        request.prompt.as_str(),
        backend,
        model,
    ] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.update([u8::from(request.system.is_some())]);
    hasher.update(request.params.max_tokens.to_be_bytes());
    hasher.update(request.params.temperature.to_be_bytes());
    hasher.update(request.params.top_p.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Storage for completed responses. A miss never fails a request.
#[async_trait]
pub trait ResponseCache: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Option<Response>;

    async fn put(&self, key: String, response: Response);

    fn stats(&self) -> CacheStats;

    async fn clear(&self);
}

/// Moka-backed cache with TTL expiry
#[derive(Debug)]
pub struct MokaResponseCache {
    cache: Cache<String, Response>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MokaResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl Default for MokaResponseCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl ResponseCache for MokaResponseCache {
    async fn get(&self, key: &str) -> Option<Response> {
        match self.cache.get(key).await {
            Some(response) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(cache_key = %key, "Response cache hit");
                Some(response)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn put(&self, key: String, response: Response) {
        self.cache.insert(key, response).await;
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: true,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }

    async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

/// Cache that never stores anything
#[derive(Debug, Default)]
pub struct DisabledCache {
    misses: AtomicU64,
}

#[async_trait]
impl ResponseCache for DisabledCache {
    async fn get(&self, _key: &str) -> Option<Response> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn put(&self, _key: String, _response: Response) {}

    fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: false,
            misses: self.misses.load(Ordering::Relaxed),
            ..Default::default()
        }
    }

    async fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use plexus_core::BackendKind;
    use plexus_llm::{FinishReason, Usage};

    fn response(content: &str) -> Response {
        Response {
            content: content.to_string(),
            backend: BackendKind::Ollama,
            model: "llama3.1:8b".to_string(),
            usage: Usage::new(10, 5),
            cost: 0.0,
            latency_ms: 120,
            created_at: Utc::now(),
            request_id: uuid::Uuid::new_v4(),
            function_calls: vec![],
            finish_reason: FinishReason::Stop,
        }
    }

    #[test]
    fn test_cache_key_tracks_completion_inputs() {
        let base = Request::new("Explain ownership");
        let same = Request::new("Explain ownership");
        assert_eq!(cache_key(&base), cache_key(&same));

        assert_ne!(cache_key(&base), cache_key(&base.clone().with_temperature(0.1)));
        assert_ne!(cache_key(&base), cache_key(&base.clone().with_max_tokens(64)));
        assert_ne!(cache_key(&base), cache_key(&base.clone().with_system("be terse")));
        assert_ne!(
            cache_key(&base),
            cache_key(&base.clone().pinned(BackendKind::OpenAi, Some("gpt-4o")))
        );
        assert_eq!(cache_key(&base).len(), 64);
    }

    #[test]
    fn test_cache_key_field_boundaries_do_not_collide() {
        let a = Request::new("y").with_system("x|");
        let b = Request::new("|y").with_system("x");
        assert_ne!(cache_key(&a), cache_key(&b));

        let a = Request::new("ab").with_system("");
        let b = Request::new("b").with_system("a");
        assert_ne!(cache_key(&a), cache_key(&b));
        assert_ne!(cache_key(&Request::new("p")), cache_key(&Request::new("p").with_system("")));
    }

    #[test]
    fn test_cache_key_separates_pinned_backends() {
        let openai = Request::new("same prompt").pinned(BackendKind::OpenAi, Some("m"));
        let anthropic = Request::new("same prompt").pinned(BackendKind::Anthropic, Some("m"));
        assert_ne!(cache_key(&openai), cache_key(&anthropic));

        let backend_only = Request::new("same prompt").pinned(BackendKind::Ollama, None);
        let model_only = {
            let mut request = Request::new("same prompt");
            request.model = Some("ollama".to_string());
            request
        };
        assert_ne!(cache_key(&backend_only), cache_key(&model_only));
        assert_ne!(cache_key(&backend_only), cache_key(&Request::new("same prompt")));
    }

    #[tokio::test]
    async fn test_moka_hit_returns_stored_response() {
        let cache = MokaResponseCache::default();
        let stored = response("cached answer");

        assert!(cache.get("k").await.is_none());
        cache.put("k".to_string(), stored.clone()).await;
        assert_eq!(cache.get("k").await, Some(stored));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = MokaResponseCache::new(&CacheConfig {
            ttl_secs: 1,
            ..Default::default()
        });
        cache.put("k".to_string(), response("short-lived")).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_always_misses() {
        let cache = DisabledCache::default();
        cache.put("k".to_string(), response("dropped")).await;
        assert!(cache.get("k").await.is_none());
        assert!(!cache.stats().enabled);
        assert_eq!(cache.stats().misses, 1);
    }
}
