//! # Plexus Router
//!
//! Capability-aware routing across LLM backends.
//!
//! - [`CapabilityCatalog`]: what each (backend, model) pair can do and how it has performed
//! - [`Router`]: eligibility filter plus weighted scoring, with an emergency path
//! - [`Manager`]: cache, routing, rate limiting, sequential fallback and outcome recording
//! - [`Learner`]: folds recorded outcomes back into the catalog
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use plexus_core::{BackendKind, Complexity, TaskCategory, TaskRequirements};
//! use plexus_llm::{MockBackend, Request};
//! use plexus_router::{Manager, PlexusConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = Manager::builder()
//!         .config(PlexusConfig::default())
//!         .backend(Arc::new(MockBackend::constant(BackendKind::Ollama, "Hello!")))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let requirements = TaskRequirements::new(TaskCategory::General, Complexity::Simple);
//!     let response = manager
//!         .generate(&Request::new("Say hello"), Some(requirements))
//!         .await
//!         .unwrap();
//!     assert_eq!(response.content, "Hello!");
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod learning;
pub mod manager;
pub mod metrics;
pub mod rate_limit;
pub mod router;

pub use cache::{cache_key, CacheConfig, CacheStats, DisabledCache, MokaResponseCache, ResponseCache};
pub use catalog::{CapabilityCatalog, Recommendation};
pub use config::{PlexusConfig, StoreConfig};
pub use error::{Attempt, RouterError};
pub use learning::{apply_outcomes, Learner, LearningConfig, LearningReport};
pub use manager::{HealthReport, Manager, ManagerBuilder};
pub use metrics::{BackendMetrics, MetricsSnapshot, RouterCounters, RouterMetrics};
pub use rate_limit::{RateLimitError, RateLimitStats, SlidingWindowLimiter};
pub use router::{
    Router, RouterBuilder, RouterConfig, ScoreBreakdown, ScoringConfig, ScoringWeights,
};
