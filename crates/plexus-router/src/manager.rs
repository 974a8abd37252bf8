//! Request orchestration
//!
//! The [`Manager`] is the single entry point callers use. For every request it
//! consults the response cache, picks a target (explicit pin or [`Router`]),
//! enforces the per-backend rate limit, invokes the adapter and walks the
//! decision's alternatives sequentially on failure. Every attempt leaves an
//! [`Outcome`] in the store, which the learning task later folds into the catalog.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use plexus_core::{
    BackendKind, Complexity, ModelKey, Outcome, RoutingDecision, TaskCategory, TaskRequirements,
};
use plexus_llm::{build_backend, Backend, BackendsConfig, ConfigError, Request, Response, TextStream};
use plexus_persist::{MemoryStore, RoutingStore, SqliteStore};

use crate::cache::{cache_key, DisabledCache, MokaResponseCache, ResponseCache};
use crate::catalog::{CapabilityCatalog, Recommendation};
use crate::config::{PlexusConfig, StoreConfig};
use crate::error::{Attempt, RouterError};
use crate::learning::{Learner, LearningReport};
use crate::metrics::{BackendMetrics, MetricsSnapshot, RouterMetrics};
use crate::rate_limit::{RateLimitError, SlidingWindowLimiter};
use crate::router::Router;

/// Result of an on-demand health check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub backends: BTreeMap<BackendKind, bool>,
    pub store: bool,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.store && self.backends.values().all(|ok| *ok)
    }
}

#[derive(Debug, Clone, Copy)]
enum Call {
    Generate,
    Function,
}

#[derive(Debug)]
struct Inner {
    adapters: BTreeMap<BackendKind, Arc<dyn Backend>>,
    catalog: Arc<CapabilityCatalog>,
    router: Router,
    limiter: SlidingWindowLimiter,
    cache: Arc<dyn ResponseCache>,
    store: Arc<dyn RoutingStore>,
    learner: Learner,
    metrics: RouterMetrics,
    health: RwLock<BTreeMap<BackendKind, bool>>,
    health_interval: Duration,
}

#[derive(Debug)]
struct Supervisor {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Owns adapters, catalog, limiter, cache, store and metrics for one deployment
#[derive(Debug)]
pub struct Manager {
    inner: Arc<Inner>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl Manager {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    /// Build adapters, catalog and store from configuration alone
    pub async fn from_config(config: PlexusConfig) -> Result<Self, RouterError> {
        Self::builder().config(config).build().await
    }

    pub fn catalog(&self) -> &Arc<CapabilityCatalog> {
        &self.inner.catalog
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn store(&self) -> &Arc<dyn RoutingStore> {
        &self.inner.store
    }

    /// Backends with a live adapter
    pub fn backends(&self) -> Vec<BackendKind> {
        self.inner.adapters.keys().copied().collect()
    }

    /// Complete a request, routing it unless it pins a backend.
    ///
    /// Non-streaming requests are served from the cache when possible; a hit makes
    /// no backend call and consumes no rate-limit budget.
    pub async fn generate(
        &self,
        request: &Request,
        requirements: Option<TaskRequirements>,
    ) -> Result<Response, RouterError> {
        let inner = &self.inner;
        inner.metrics.record_request();

        let key = (!request.stream).then(|| cache_key(request));
        if let Some(key) = &key {
            if let Some(hit) = inner.cache.get(key).await {
                return Ok(hit);
            }
        }

        let requirements = requirements_for(request, requirements);
        let plan = inner.plan(request, &requirements).await?;
        let response = inner.invoke(request, &requirements, plan, Call::Generate).await?;

        if let Some(key) = key {
            inner.cache.put(key, response.clone()).await;
        }
        Ok(response)
    }

    /// Ask a function-calling model which declared function to call. Never cached.
    pub async fn call_function(
        &self,
        request: &Request,
        requirements: Option<TaskRequirements>,
    ) -> Result<Response, RouterError> {
        let inner = &self.inner;
        inner.metrics.record_request();

        if request.functions.is_empty() {
            return Err(RouterError::InvalidRequest(
                "call_function needs at least one declared function".to_string(),
            ));
        }

        let mut requirements = requirements_for(request, requirements);
        requirements.requires_function_calling = true;
        let plan = inner.plan(request, &requirements).await?;
        inner.invoke(request, &requirements, plan, Call::Function).await
    }

    /// Open a stream on the best backend.
    ///
    /// Alternatives are tried only while opening; once fragments flow, errors are
    /// yielded in-band and the stream ends. An outcome is recorded when it finishes
    /// or when the caller drops it; dropping stops reads from the backend.
    pub async fn stream(
        &self,
        request: &Request,
        requirements: Option<TaskRequirements>,
    ) -> Result<TextStream, RouterError> {
        let inner = &self.inner;
        inner.metrics.record_request();

        let mut requirements = requirements_for(request, requirements);
        requirements.requires_streaming = true;
        let plan = inner.plan(request, &requirements).await?;

        let mut attempts = Vec::new();
        for key in plan {
            let Some(adapter) = inner.admit(&key, &mut attempts)? else {
                continue;
            };
            if !attempts.is_empty() {
                inner.metrics.record_fallback();
            }

            let started = Instant::now();
            match adapter.stream(request, &key.model).await {
                Ok(upstream) => {
                    inner.metrics.record_stream();
                    debug!(backend = %key.backend, model = %key.model, "Stream opened");
                    return Ok(self.track_stream(upstream, key, requirements, started));
                }
                Err(e) => {
                    inner.fail(&key, &requirements, started.elapsed(), &e.to_string(), &mut attempts).await;
                }
            }
        }

        inner.metrics.record_exhausted();
        Err(RouterError::AllBackendsFailed { attempts })
    }

    fn track_stream(
        &self,
        upstream: TextStream,
        key: ModelKey,
        requirements: TaskRequirements,
        started: Instant,
    ) -> TextStream {
        let mut outcome = StreamOutcome {
            inner: Arc::clone(&self.inner),
            key,
            requirements,
            started,
            fragments: 0,
            success: true,
            recorded: false,
        };
        Box::pin(async_stream::stream! {
            let mut upstream = upstream;
            while let Some(item) = upstream.next().await {
                let failed = item.is_err();
                if failed {
                    outcome.success = false;
                } else {
                    outcome.fragments = outcome.fragments.saturating_add(1);
                }
                yield item;
                if failed {
                    break;
                }
            }
            outcome.finish().await;
        })
    }

    /// Probe every adapter and the store
    pub async fn health_check(&self) -> HealthReport {
        self.inner.check_health().await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        let health = inner.health.read();
        let backends = inner
            .adapters
            .iter()
            .map(|(kind, adapter)| BackendMetrics {
                backend: *kind,
                healthy: health.get(kind).copied(),
                usage: adapter.usage(),
                rate_limit: inner.limiter.stats(*kind),
            })
            .collect();

        MetricsSnapshot {
            router: inner.metrics.counters(),
            backends,
            cache: inner.cache.stats(),
            catalog_entries: inner.catalog.len(),
        }
    }

    /// Catalog entries suited to a category and complexity, best first
    pub fn recommend(&self, category: TaskCategory, complexity: Complexity) -> Vec<Recommendation> {
        self.inner
            .catalog
            .recommend(category, complexity, &self.inner.router.config().scoring)
    }

    /// Recent routing decisions, newest first
    pub async fn recent_decisions(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RoutingDecision>, RouterError> {
        Ok(self.inner.store.decisions_since(since, limit).await?)
    }

    /// Run one learning pass now, independent of the background schedule
    pub async fn run_learning_pass(&self) -> Result<LearningReport, RouterError> {
        self.inner.learn().await
    }

    /// Spawn the learning and health-check tasks. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut supervisor = self.supervisor.lock();
        if supervisor.is_some() {
            return;
        }

        let (shutdown, signal) = watch::channel(false);
        let mut handles = Vec::new();

        let learning = self.inner.learner.config();
        if learning.enabled {
            let inner = Arc::clone(&self.inner);
            let mut signal = signal.clone();
            let period = Duration::from_secs(learning.interval_secs.max(1));
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = signal.changed() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = inner.learn().await {
                                warn!(error = %e, "Learning pass failed");
                            }
                        }
                    }
                }
                debug!("Learning task stopped");
            }));
        }

        if !self.inner.health_interval.is_zero() {
            let inner = Arc::clone(&self.inner);
            let mut signal = signal.clone();
            let period = self.inner.health_interval;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = signal.changed() => break,
                        _ = ticker.tick() => {
                            inner.check_health().await;
                        }
                    }
                }
                debug!("Health-check task stopped");
            }));
        }

        info!(tasks = handles.len(), "Background tasks started");
        *supervisor = Some(Supervisor { shutdown, handles });
    }

    /// Signal background tasks to stop and wait for them
    pub async fn shutdown(&self) {
        let supervisor = self.supervisor.lock().take();
        let Some(supervisor) = supervisor else {
            return;
        };

        let _ = supervisor.shutdown.send(true);
        for handle in supervisor.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Background tasks stopped");
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            let _ = supervisor.shutdown.send(true);
            for handle in supervisor.handles {
                handle.abort();
            }
        }
    }
}

/// Outcome of one open stream, written exactly once.
///
/// A stream that runs to its end records inline. One the consumer drops early is
/// recorded from a spawned task with the fragments delivered so far; a cancelled
/// stream that saw no error counts as a success.
struct StreamOutcome {
    inner: Arc<Inner>,
    key: ModelKey,
    requirements: TaskRequirements,
    started: Instant,
    fragments: u32,
    success: bool,
    recorded: bool,
}

impl StreamOutcome {
    async fn finish(&mut self) {
        self.recorded = true;
        if !self.success {
            self.inner.metrics.record_backend_failure();
        }
        self.inner
            .record_outcome(
                &self.key,
                &self.requirements,
                self.started.elapsed(),
                self.success,
                0.0,
                self.fragments,
            )
            .await;
    }
}

impl Drop for StreamOutcome {
    fn drop(&mut self) {
        if self.recorded {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(backend = %self.key.backend, model = %self.key.model, "Stream dropped outside a runtime; outcome lost");
            return;
        };

        debug!(
            backend = %self.key.backend,
            model = %self.key.model,
            fragments = self.fragments,
            "Stream dropped before completion"
        );
        let inner = Arc::clone(&self.inner);
        let key = self.key.clone();
        let requirements = self.requirements.clone();
        let elapsed = self.started.elapsed();
        let (success, fragments) = (self.success, self.fragments);
        runtime.spawn(async move {
            inner
                .record_outcome(&key, &requirements, elapsed, success, 0.0, fragments)
                .await;
        });
    }
}

/// Caller-supplied requirements (or defaults) with request metadata hints folded in
fn requirements_for(request: &Request, supplied: Option<TaskRequirements>) -> TaskRequirements {
    let mut requirements = supplied.unwrap_or_default();
    requirements.absorb_hints(&request.metadata);
    requirements
}

impl Inner {
    /// Ordered targets to try: a pin yields one, routing yields the decision's fallback order
    async fn plan(&self, request: &Request, requirements: &TaskRequirements) -> Result<Vec<ModelKey>, RouterError> {
        match (request.backend, request.model.as_deref()) {
            (Some(kind), model) => {
                let adapter = self
                    .adapters
                    .get(&kind)
                    .ok_or(RouterError::BackendUnavailable(kind))?;
                let model = model.unwrap_or_else(|| adapter.default_model());
                Ok(vec![ModelKey::new(kind, model)])
            }
            (None, Some(model)) => self
                .catalog
                .find_model(model)
                .into_iter()
                .find(|key| self.adapters.contains_key(&key.backend))
                .map(|key| vec![key])
                .ok_or_else(|| {
                    RouterError::InvalidRequest(format!(
                        "model {model} is not served by any configured backend; pin a backend to use it"
                    ))
                }),
            (None, None) => {
                let decision = self.router.route(request, requirements).await;
                self.metrics.record_route(decision.emergency);
                Ok(decision.fallback_order())
            }
        }
    }

    /// The adapter for `key` if one exists and the limiter admits the call.
    ///
    /// A limited first choice is a hard `Capacity` error; limited alternatives are
    /// recorded and skipped.
    fn admit(&self, key: &ModelKey, attempts: &mut Vec<Attempt>) -> Result<Option<Arc<dyn Backend>>, RouterError> {
        let Some(adapter) = self.adapters.get(&key.backend) else {
            attempts.push(Attempt::new(key, "backend not configured"));
            return Ok(None);
        };

        if let Err(RateLimitError::Limited { retry_after }) = self.limiter.try_acquire(key.backend) {
            self.metrics.record_capacity_rejection();
            if attempts.is_empty() {
                return Err(RouterError::Capacity {
                    backend: key.backend,
                    retry_after,
                });
            }
            debug!(backend = %key.backend, ?retry_after, "Skipping rate-limited alternative");
            attempts.push(Attempt::new(
                key,
                format!("rate limited, retry after {}ms", retry_after.as_millis()),
            ));
            return Ok(None);
        }

        Ok(Some(Arc::clone(adapter)))
    }

    async fn invoke(
        &self,
        request: &Request,
        requirements: &TaskRequirements,
        plan: Vec<ModelKey>,
        call: Call,
    ) -> Result<Response, RouterError> {
        let mut attempts = Vec::new();

        for key in plan {
            let Some(adapter) = self.admit(&key, &mut attempts)? else {
                continue;
            };
            if !attempts.is_empty() {
                self.metrics.record_fallback();
                info!(backend = %key.backend, model = %key.model, attempt = attempts.len() + 1, "Falling back");
            }

            let started = Instant::now();
            let result = match call {
                Call::Generate => adapter.generate(request, &key.model).await,
                Call::Function => adapter.call_function(request, &key.model).await,
            };

            match result {
                Ok(response) => {
                    let tokens = response.usage.total_tokens;
                    self.metrics.record_tokens(tokens as u64);
                    self.record_outcome(&key, requirements, started.elapsed(), true, response.cost, tokens)
                        .await;
                    debug!(
                        backend = %key.backend,
                        model = %key.model,
                        latency_ms = response.latency_ms,
                        tokens,
                        "Request completed"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    self.fail(&key, requirements, started.elapsed(), &e.to_string(), &mut attempts)
                        .await;
                }
            }
        }

        self.metrics.record_exhausted();
        Err(RouterError::AllBackendsFailed { attempts })
    }

    async fn fail(
        &self,
        key: &ModelKey,
        requirements: &TaskRequirements,
        elapsed: Duration,
        reason: &str,
        attempts: &mut Vec<Attempt>,
    ) {
        self.metrics.record_backend_failure();
        warn!(backend = %key.backend, model = %key.model, error = %reason, "Backend call failed");
        self.record_outcome(key, requirements, elapsed, false, 0.0, 0).await;
        attempts.push(Attempt::new(key, reason));
    }

    async fn record_outcome(
        &self,
        key: &ModelKey,
        requirements: &TaskRequirements,
        elapsed: Duration,
        success: bool,
        cost: f64,
        tokens_used: u32,
    ) {
        let outcome = Outcome {
            backend: key.backend,
            model: key.model.clone(),
            task_category: requirements.category,
            complexity: requirements.complexity,
            latency_ms: elapsed.as_millis().min(u64::MAX as u128) as u64,
            success,
            cost,
            tokens_used,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.store.append_outcome(&outcome).await {
            warn!(backend = %key.backend, model = %key.model, error = %e, "Failed to persist outcome");
        }
    }

    async fn check_health(&self) -> HealthReport {
        let checks = self
            .adapters
            .iter()
            .map(|(kind, adapter)| async move { (*kind, adapter.health_check().await) });
        let backends: BTreeMap<BackendKind, bool> = futures::future::join_all(checks).await.into_iter().collect();

        for (kind, healthy) in &backends {
            if !healthy {
                warn!(backend = %kind, "Backend health check failed");
            }
        }
        *self.health.write() = backends.clone();

        HealthReport {
            backends,
            store: self.store.is_healthy().await,
        }
    }

    async fn learn(&self) -> Result<LearningReport, RouterError> {
        let report = self.learner.run_pass().await?;
        self.metrics.record_learning_pass(report.updated.len());
        Ok(report)
    }
}

/// Builder for [`Manager`].
///
/// Explicit backends replace config-driven adapter construction entirely, which is
/// how tests and offline runs plug in [`MockBackend`](plexus_llm::MockBackend)s.
#[derive(Debug, Default)]
pub struct ManagerBuilder {
    config: PlexusConfig,
    backends: Vec<Arc<dyn Backend>>,
    catalog: Option<CapabilityCatalog>,
    store: Option<Arc<dyn RoutingStore>>,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl ManagerBuilder {
    pub fn config(mut self, config: PlexusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Use this catalog instead of the built-in seed table
    pub fn catalog(mut self, catalog: CapabilityCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn store(mut self, store: Arc<dyn RoutingStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn build(self) -> Result<Manager, RouterError> {
        let config = self.config;
        config.validate()?;

        let adapters: BTreeMap<BackendKind, Arc<dyn Backend>> = if self.backends.is_empty() {
            build_adapters(&config.backends)
        } else {
            self.backends.into_iter().map(|b| (b.kind(), b)).collect()
        };
        let enabled: Vec<BackendKind> = adapters.keys().copied().collect();
        if enabled.is_empty() {
            warn!("No backends available; routed requests will fail");
        }

        let catalog = Arc::new(self.catalog.unwrap_or_else(CapabilityCatalog::seeded));
        let dropped = catalog.retain_backends(&enabled);
        if dropped > 0 {
            debug!(dropped, "Removed catalog entries for unavailable backends");
        }

        let store = match self.store {
            Some(store) => store,
            None => open_store(&config.store).await?,
        };
        match store.load_capabilities().await {
            Ok(persisted) if !persisted.is_empty() => {
                let merged = catalog.overlay(persisted, &enabled);
                info!(merged, "Restored learned capabilities");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not load persisted capabilities; using seed estimates"),
        }

        let limiter = enabled.iter().fold(SlidingWindowLimiter::default(), |limiter, kind| {
            match config.backends.get(*kind).rate_limit_per_minute {
                Some(ceiling) => limiter.with_limit(*kind, ceiling),
                None => limiter,
            }
        });

        let cache: Arc<dyn ResponseCache> = match self.cache {
            Some(cache) => cache,
            None if config.cache.enabled => Arc::new(MokaResponseCache::new(&config.cache)),
            None => Arc::new(DisabledCache::default()),
        };

        let router = Router::builder()
            .catalog(Arc::clone(&catalog))
            .store(Arc::clone(&store))
            .config(config.routing.clone())
            .build();
        let learner = Learner::new(config.learning.clone(), Arc::clone(&catalog), Arc::clone(&store));

        info!(
            backends = ?enabled,
            catalog = catalog.len(),
            store = store.name(),
            cache = config.cache.enabled,
            "Manager ready"
        );

        Ok(Manager {
            inner: Arc::new(Inner {
                adapters,
                catalog,
                router,
                limiter,
                cache,
                store,
                learner,
                metrics: RouterMetrics::new(),
                health: RwLock::new(BTreeMap::new()),
                health_interval: Duration::from_secs(config.health_check_interval_secs),
            }),
            supervisor: Mutex::new(None),
        })
    }
}

/// Adapters for every enabled backend whose configuration validates
fn build_adapters(config: &BackendsConfig) -> BTreeMap<BackendKind, Arc<dyn Backend>> {
    let mut adapters = BTreeMap::new();
    for kind in BackendKind::ALL {
        match build_backend(kind, config.get(kind)) {
            Ok(adapter) => {
                adapters.insert(kind, adapter);
            }
            Err(ConfigError::Disabled(_)) => debug!(backend = %kind, "Backend disabled"),
            Err(e) => warn!(backend = %kind, error = %e, "Excluding misconfigured backend"),
        }
    }
    adapters
}

async fn open_store(config: &StoreConfig) -> Result<Arc<dyn RoutingStore>, RouterError> {
    match &config.url {
        Some(url) => {
            let store = SqliteStore::new(url).await?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::ModelCapability;
    use plexus_llm::{FunctionDecl, LlmError, MockBackend};

    fn capability(backend: BackendKind, model: &str) -> ModelCapability {
        ModelCapability::new(backend, model)
            .with_categories(&[TaskCategory::General])
            .with_function_calling(true)
    }

    fn quiet_config() -> PlexusConfig {
        let mut config = PlexusConfig::default();
        config.learning.enabled = false;
        config.health_check_interval_secs = 0;
        config
    }

    #[tokio::test]
    async fn test_pinned_backend_must_exist() {
        let manager = Manager::builder()
            .config(quiet_config())
            .backend(Arc::new(MockBackend::constant(BackendKind::Ollama, "hi")))
            .build()
            .await
            .unwrap();

        let request = Request::new("hello").pinned(BackendKind::OpenAi, None);
        let err = manager.generate(&request, None).await.unwrap_err();
        assert!(matches!(err, RouterError::BackendUnavailable(BackendKind::OpenAi)));
    }

    #[tokio::test]
    async fn test_pinned_request_uses_default_model() {
        let mock = Arc::new(MockBackend::constant(BackendKind::Ollama, "pinned").with_model("qwen2:7b"));
        let manager = Manager::builder()
            .config(quiet_config())
            .backend(mock.clone())
            .build()
            .await
            .unwrap();

        let request = Request::new("hello").pinned(BackendKind::Ollama, None);
        let response = manager.generate(&request, None).await.unwrap();
        assert_eq!(response.model, "qwen2:7b");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_call_function_requires_declarations() {
        let manager = Manager::builder()
            .config(quiet_config())
            .backend(Arc::new(MockBackend::constant(BackendKind::Ollama, "x")))
            .catalog(CapabilityCatalog::from_capabilities(vec![capability(BackendKind::Ollama, "llama3.1:8b")]))
            .build()
            .await
            .unwrap();

        let err = manager.call_function(&Request::new("weather?"), None).await.unwrap_err();
        assert!(matches!(err, RouterError::InvalidRequest(_)));

        let request = Request::new("weather?").with_function(FunctionDecl::new(
            "get_weather",
            "Weather lookup",
            serde_json::json!({"type": "object"}),
        ));
        let response = manager.call_function(&request, None).await.unwrap();
        assert_eq!(response.function_calls[0].name, "get_weather");
    }

    #[tokio::test]
    async fn test_stream_falls_back_while_opening() {
        let broken = Arc::new(MockBackend::failing(BackendKind::OpenAi, LlmError::Transport("refused".into())));
        let local = Arc::new(MockBackend::constant(BackendKind::Ollama, "streamed reply text"));
        let store = Arc::new(MemoryStore::new());
        let manager = Manager::builder()
            .config(quiet_config())
            .backend(broken.clone())
            .backend(local.clone())
            .store(store.clone())
            .catalog(CapabilityCatalog::from_capabilities(vec![
                capability(BackendKind::OpenAi, "gpt-4o").with_performance(100.0, 1.0),
                capability(BackendKind::Ollama, "llama3.1:8b").with_performance(9000.0, 0.5),
            ]))
            .build()
            .await
            .unwrap();

        let stream = manager.stream(&Request::new("tell me").streaming(), None).await.unwrap();
        let text: String = stream.map(|f| f.unwrap()).collect::<Vec<_>>().await.concat();

        assert_eq!(text, "streamed reply text");
        assert_eq!(broken.calls(), 1);
        assert_eq!(local.calls(), 1);
        assert_eq!(store.outcome_count().await, 2);
        assert_eq!(manager.metrics().router.streams, 1);
    }

    #[tokio::test]
    async fn test_start_and_shutdown_background_tasks() {
        let mut config = PlexusConfig::default();
        config.learning.interval_secs = 1;
        config.health_check_interval_secs = 1;
        let manager = Manager::builder()
            .config(config)
            .backend(Arc::new(MockBackend::constant(BackendKind::Ollama, "x")))
            .build()
            .await
            .unwrap();

        manager.start();
        manager.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.metrics().backends[0].healthy, Some(true));
        manager.shutdown().await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_report() {
        let sick = Arc::new(MockBackend::constant(BackendKind::OpenAi, "x"));
        sick.set_healthy(false);
        let manager = Manager::builder()
            .config(quiet_config())
            .backend(sick)
            .backend(Arc::new(MockBackend::constant(BackendKind::Ollama, "x")))
            .build()
            .await
            .unwrap();

        let report = manager.health_check().await;
        assert!(!report.backends[&BackendKind::OpenAi]);
        assert!(report.backends[&BackendKind::Ollama]);
        assert!(report.store);
        assert!(!report.all_healthy());
    }
}
