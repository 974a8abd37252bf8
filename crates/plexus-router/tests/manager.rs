//! End-to-end manager behaviour with mock backends

use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use plexus_core::{
    BackendKind, Complexity, ModelCapability, ModelKey, Outcome, TaskCategory, TaskRequirements,
};
use plexus_llm::{LlmError, MockBackend, Request};
use plexus_persist::{MemoryStore, RoutingStore, SqliteConfig, SqliteStore};
use plexus_router::{CapabilityCatalog, Manager, PlexusConfig, RouterError};

fn config() -> PlexusConfig {
    let mut config = PlexusConfig::default();
    config.learning.enabled = false;
    config.health_check_interval_secs = 0;
    config
}

fn capability(backend: BackendKind, model: &str, latency_ms: f64) -> ModelCapability {
    ModelCapability::new(backend, model)
        .with_categories(&[TaskCategory::General, TaskCategory::Analysis])
        .with_max_complexity(Complexity::Complex)
        .with_function_calling(true)
        .with_performance(latency_ms, 0.95)
}

fn general() -> Option<TaskRequirements> {
    Some(TaskRequirements::new(TaskCategory::General, Complexity::Medium))
}

#[tokio::test]
async fn test_cache_hit_skips_backend() {
    let mock = Arc::new(MockBackend::new(
        BackendKind::Ollama,
        vec!["first".to_string(), "second".to_string()],
    ));
    let manager = Manager::builder()
        .config(config())
        .backend(mock.clone())
        .build()
        .await
        .unwrap();

    let request = Request::new("What is a monad?");
    let a = manager.generate(&request, general()).await.unwrap();
    let b = manager.generate(&request, general()).await.unwrap();

    assert_eq!(mock.calls(), 1);
    assert_eq!(a, b);
    assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    assert_eq!(b.content, "first");

    let metrics = manager.metrics();
    assert_eq!(metrics.cache.hits, 1);
    assert_eq!(metrics.router.requests, 2);
    assert_eq!(metrics.router.routed, 1);
}

#[tokio::test]
async fn test_disabled_cache_calls_every_time() {
    let mut config = config();
    config.cache.enabled = false;
    let mock = Arc::new(MockBackend::constant(BackendKind::Ollama, "same"));
    let manager = Manager::builder()
        .config(config)
        .backend(mock.clone())
        .build()
        .await
        .unwrap();

    let request = Request::new("repeat me");
    manager.generate(&request, general()).await.unwrap();
    manager.generate(&request, general()).await.unwrap();
    assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn test_fallback_exhaustion_reports_every_attempt() {
    let failing = [BackendKind::OpenAi, BackendKind::Anthropic, BackendKind::Ollama]
        .map(|kind| Arc::new(MockBackend::failing(kind, LlmError::Transport("connection refused".into()))));
    let store = Arc::new(MemoryStore::new());

    let mut builder = Manager::builder()
        .config(config())
        .store(store.clone())
        .catalog(CapabilityCatalog::from_capabilities(vec![
            capability(BackendKind::OpenAi, "gpt-4o", 1000.0),
            capability(BackendKind::Anthropic, "claude-3-5-sonnet-latest", 2000.0),
            capability(BackendKind::Ollama, "llama3.1:8b", 3000.0),
        ]));
    for mock in &failing {
        builder = builder.backend(mock.clone());
    }
    let manager = builder.build().await.unwrap();

    let err = manager
        .generate(&Request::new("anyone there?"), general())
        .await
        .unwrap_err();

    let RouterError::AllBackendsFailed { attempts } = err else {
        panic!("expected AllBackendsFailed");
    };
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].backend, BackendKind::OpenAi);
    assert!(attempts.iter().all(|a| a.reason.contains("connection refused")));
    assert_eq!(failing.iter().map(|m| m.calls()).sum::<usize>(), 3);

    assert_eq!(store.outcome_count().await, 3);
    let outcomes = store.outcomes_since(Utc::now() - ChronoDuration::minutes(1)).await.unwrap();
    assert!(outcomes.iter().all(|o| !o.success));
    assert_eq!(manager.metrics().router.fallbacks, 2);
}

#[tokio::test]
async fn test_fallback_recovers_on_next_alternative() {
    let broken = Arc::new(MockBackend::failing(
        BackendKind::OpenAi,
        LlmError::Status { status: 503, body: "overloaded".into() },
    ));
    let local = Arc::new(MockBackend::constant(BackendKind::Ollama, "local answer"));
    let manager = Manager::builder()
        .config(config())
        .backend(broken.clone())
        .backend(local.clone())
        .catalog(CapabilityCatalog::from_capabilities(vec![
            capability(BackendKind::OpenAi, "gpt-4o", 500.0),
            capability(BackendKind::Ollama, "llama3.1:8b", 5000.0),
        ]))
        .build()
        .await
        .unwrap();

    let response = manager.generate(&Request::new("hello"), general()).await.unwrap();
    assert_eq!(response.content, "local answer");
    assert_eq!(response.backend, BackendKind::Ollama);
    assert_eq!(broken.calls(), 1);
    assert_eq!(local.calls(), 1);
}

#[tokio::test]
async fn test_rate_limit_rejects_without_calling_backend() {
    let mut config = config();
    config.backends.ollama.rate_limit_per_minute = Some(2);
    let mock = Arc::new(MockBackend::constant(BackendKind::Ollama, "ok"));
    let manager = Manager::builder()
        .config(config)
        .backend(mock.clone())
        .build()
        .await
        .unwrap();

    manager.generate(&Request::new("one"), general()).await.unwrap();
    manager.generate(&Request::new("two"), general()).await.unwrap();
    let err = manager.generate(&Request::new("three"), general()).await.unwrap_err();

    match err {
        RouterError::Capacity { backend, retry_after } => {
            assert_eq!(backend, BackendKind::Ollama);
            assert!(retry_after.as_secs() <= 60);
        }
        other => panic!("expected Capacity, got {other}"),
    }
    assert_eq!(mock.calls(), 2);

    // cache hits do not consume the budget
    manager.generate(&Request::new("one"), general()).await.unwrap();
    assert_eq!(mock.calls(), 2);
    assert_eq!(manager.metrics().router.capacity_rejections, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_rate_limit() {
    let ceiling = 3;
    let excess = 4;
    let mut config = config();
    config.backends.ollama.rate_limit_per_minute = Some(ceiling);
    let mock = Arc::new(
        MockBackend::constant(BackendKind::Ollama, "ok").with_latency(Duration::from_millis(50)),
    );
    let manager = Arc::new(
        Manager::builder()
            .config(config)
            .backend(mock.clone())
            .build()
            .await
            .unwrap(),
    );

    let handles = (0..ceiling + excess).map(|i| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .generate(&Request::new(format!("question {i}")), general())
                .await
        })
    });
    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let served = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(RouterError::Capacity { backend: BackendKind::Ollama, .. })))
        .count();
    assert_eq!(served, ceiling as usize);
    assert_eq!(rejected, excess as usize);
    assert_eq!(mock.calls(), ceiling as usize);
    assert_eq!(manager.metrics().router.capacity_rejections, excess as u64);
}

#[tokio::test]
async fn test_dropped_stream_stops_backend_reads() {
    let store = Arc::new(MemoryStore::new());
    let mock = Arc::new(
        MockBackend::constant(BackendKind::Ollama, "one two three four five six")
            .with_fragment_delay(Duration::from_millis(20)),
    );
    let manager = Manager::builder()
        .config(config())
        .backend(mock.clone())
        .store(store.clone())
        .build()
        .await
        .unwrap();

    let mut stream = manager
        .stream(&Request::new("count for me").streaming(), general())
        .await
        .unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "one ");
    drop(stream);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(mock.fragments_sent(), 1);

    let outcomes = store
        .outcomes_since(Utc::now() - ChronoDuration::minutes(1))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].success);
    assert_eq!(outcomes[0].tokens_used, 1);
    assert_eq!(outcomes[0].backend, BackendKind::Ollama);
}

#[tokio::test]
async fn test_rate_limited_alternative_is_skipped() {
    let mut config = config();
    config.backends.ollama.rate_limit_per_minute = Some(1);
    let broken = Arc::new(MockBackend::failing(BackendKind::OpenAi, LlmError::RateLimited));
    let local = Arc::new(MockBackend::constant(BackendKind::Ollama, "local"));
    let manager = Manager::builder()
        .config(config)
        .backend(broken.clone())
        .backend(local.clone())
        .catalog(CapabilityCatalog::from_capabilities(vec![
            capability(BackendKind::OpenAi, "gpt-4o", 500.0),
            capability(BackendKind::Ollama, "llama3.1:8b", 5000.0),
        ]))
        .build()
        .await
        .unwrap();

    let pinned = Request::new("use the slot").pinned(BackendKind::Ollama, Some("llama3.1:8b"));
    manager.generate(&pinned, None).await.unwrap();

    let err = manager.generate(&Request::new("routed"), general()).await.unwrap_err();
    let RouterError::AllBackendsFailed { attempts } = err else {
        panic!("expected AllBackendsFailed");
    };
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].backend, BackendKind::Ollama);
    assert!(attempts[1].reason.starts_with("rate limited"));
    assert_eq!(local.calls(), 1);
}

#[tokio::test]
async fn test_emergency_path_serves_request() {
    let local = Arc::new(MockBackend::constant(BackendKind::Ollama, "best effort"));
    let store = Arc::new(MemoryStore::new());
    let manager = Manager::builder()
        .config(config())
        .backend(local.clone())
        .store(store.clone())
        .catalog(CapabilityCatalog::from_capabilities(vec![capability(
            BackendKind::Ollama,
            "llama3.1:8b",
            1000.0,
        )]))
        .build()
        .await
        .unwrap();

    let requirements = TaskRequirements::new(TaskCategory::Creative, Complexity::Expert);
    let response = manager
        .generate(&Request::new("Compose a symphony"), Some(requirements))
        .await
        .unwrap();
    assert_eq!(response.content, "best effort");
    assert_eq!(response.model, "llama3.1:8b");

    let decisions = manager
        .recent_decisions(Utc::now() - ChronoDuration::minutes(1), 5)
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].emergency);
    assert!(decisions[0].confidence <= 0.2);
    assert_eq!(manager.metrics().router.emergency_routes, 1);
}

#[tokio::test]
async fn test_metadata_hints_shape_routing() {
    let cloud = Arc::new(MockBackend::constant(BackendKind::OpenAi, "cloud"));
    let local = Arc::new(MockBackend::constant(BackendKind::Ollama, "local"));
    let manager = Manager::builder()
        .config(config())
        .backend(cloud.clone())
        .backend(local.clone())
        .catalog(CapabilityCatalog::from_capabilities(vec![
            capability(BackendKind::OpenAi, "gpt-4o", 1500.0),
            capability(BackendKind::Ollama, "llama3.1:8b", 1500.0),
        ]))
        .build()
        .await
        .unwrap();

    let request = Request::new("Review this contract")
        .with_metadata("privacy_sensitive", serde_json::json!(true))
        .with_metadata("task_category", serde_json::json!("analysis"));
    let response = manager.generate(&request, None).await.unwrap();
    assert_eq!(response.backend, BackendKind::Ollama);
    assert_eq!(cloud.calls(), 0);
}

#[tokio::test]
async fn test_learning_converges_on_observed_latency() {
    let store = Arc::new(MemoryStore::new());
    let manager = Manager::builder()
        .config(config())
        .backend(Arc::new(MockBackend::constant(BackendKind::Ollama, "x")))
        .store(store.clone())
        .build()
        .await
        .unwrap();

    let key = ModelKey::new(BackendKind::Ollama, "llama3.1:8b");
    let start = manager.catalog().get(&key).unwrap();
    let base = Utc::now();

    for round in 0..10i64 {
        for i in 0..6i64 {
            store
                .append_outcome(&Outcome {
                    backend: BackendKind::Ollama,
                    model: "llama3.1:8b".to_string(),
                    task_category: TaskCategory::General,
                    complexity: Complexity::Medium,
                    latency_ms: 400,
                    success: true,
                    cost: 0.0,
                    tokens_used: 50,
                    timestamp: base + ChronoDuration::seconds(round) + ChronoDuration::milliseconds(i * 10 + 1),
                })
                .await
                .unwrap();
        }
        let report = manager.run_learning_pass().await.unwrap();
        assert_eq!(report.updated, vec![key.clone()]);

        // replaying the same window changes nothing
        let replay = manager.run_learning_pass().await.unwrap();
        assert!(replay.updated.is_empty());
    }

    let learned = manager.catalog().get(&key).unwrap();
    assert!((learned.avg_latency_ms - 400.0).abs() < 5.0, "latency {}", learned.avg_latency_ms);
    assert!(learned.success_rate > 0.99);
    assert!(learned.success_rate > start.success_rate);
    assert_eq!(manager.metrics().router.learning_passes, 20);
}

#[tokio::test]
async fn test_live_traffic_feeds_learning() {
    let store = Arc::new(MemoryStore::new());
    let manager = Manager::builder()
        .config(config())
        .backend(Arc::new(MockBackend::constant(BackendKind::Ollama, "x")))
        .store(store.clone())
        .catalog(CapabilityCatalog::from_capabilities(vec![capability(
            BackendKind::Ollama,
            "llama3.1:8b",
            9000.0,
        )]))
        .build()
        .await
        .unwrap();

    for i in 0..5 {
        manager
            .generate(&Request::new(format!("prompt {i}")), general())
            .await
            .unwrap();
    }
    let report = manager.run_learning_pass().await.unwrap();
    assert_eq!(report.applied, 5);

    let key = ModelKey::new(BackendKind::Ollama, "llama3.1:8b");
    assert!(manager.catalog().get(&key).unwrap().avg_latency_ms < 9000.0);
}

#[tokio::test]
async fn test_learned_capabilities_survive_restart() {
    let store: Arc<dyn RoutingStore> =
        Arc::new(SqliteStore::new_with_config(SqliteConfig::memory()).await.unwrap());
    let key = ModelKey::new(BackendKind::Ollama, "llama3.1:8b");

    let first = Manager::builder()
        .config(config())
        .backend(Arc::new(MockBackend::constant(BackendKind::Ollama, "x")))
        .store(store.clone())
        .build()
        .await
        .unwrap();
    for i in 0..5 {
        first
            .generate(&Request::new(format!("warm-up {i}")), general())
            .await
            .unwrap();
    }
    first.run_learning_pass().await.unwrap();
    let learned = first.catalog().get(&key).unwrap();
    drop(first);

    let second = Manager::builder()
        .config(config())
        .backend(Arc::new(MockBackend::constant(BackendKind::Ollama, "x")))
        .store(store)
        .build()
        .await
        .unwrap();
    let restored = second.catalog().get(&key).unwrap();
    assert!((restored.avg_latency_ms - learned.avg_latency_ms).abs() < 1e-9);
    assert!((restored.success_rate - learned.success_rate).abs() < 1e-9);
}

#[tokio::test]
async fn test_misconfigured_backends_are_excluded() {
    let manager = Manager::from_config(config()).await.unwrap();
    assert_eq!(manager.backends(), vec![BackendKind::Ollama]);
    assert!(manager
        .catalog()
        .snapshot()
        .iter()
        .all(|c| c.backend == BackendKind::Ollama));
}

#[tokio::test]
async fn test_recommendations_cover_enabled_backends_only() {
    let manager = Manager::builder()
        .config(config())
        .backend(Arc::new(MockBackend::constant(BackendKind::Anthropic, "x")))
        .build()
        .await
        .unwrap();

    let recs = manager.recommend(TaskCategory::Analysis, Complexity::Expert);
    assert!(!recs.is_empty());
    assert!(recs.iter().all(|r| r.key.backend == BackendKind::Anthropic));
    assert!(recs.iter().all(|r| r.considerations.iter().any(|c| c.starts_with("Cloud-hosted"))));
}
