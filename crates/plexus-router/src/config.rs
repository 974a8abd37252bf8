//! Top-level Plexus configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use plexus_llm::{BackendsConfig, ConfigError};

use crate::cache::CacheConfig;
use crate::learning::LearningConfig;
use crate::router::RouterConfig;

/// Where routing history is kept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// sqlx SQLite URL; in-memory store when unset
    pub url: Option<String>,
}

/// Everything a [`Manager`](crate::Manager) needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlexusConfig {
    pub backends: BackendsConfig,
    pub cache: CacheConfig,
    pub routing: RouterConfig,
    pub learning: LearningConfig,
    /// Seconds between background health checks; 0 disables them
    pub health_check_interval_secs: u64,
    pub store: StoreConfig,
}

impl Default for PlexusConfig {
    fn default() -> Self {
        Self {
            backends: BackendsConfig::default(),
            cache: CacheConfig::default(),
            routing: RouterConfig::default(),
            learning: LearningConfig::default(),
            health_check_interval_secs: 60,
            store: StoreConfig::default(),
        }
    }
}

fn flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl PlexusConfig {
    /// Build configuration from environment variables.
    ///
    /// Backend settings come from [`BackendsConfig::from_env`]; the rest from
    /// `PLEXUS_CACHE_TTL_SECS`, `PLEXUS_EXPLORATION`, `PLEXUS_LEARNING`,
    /// `PLEXUS_HEALTH_INTERVAL_SECS` and `PLEXUS_DATABASE_URL`.
    pub fn from_env() -> Self {
        let mut config = Self {
            backends: BackendsConfig::from_env(),
            ..Default::default()
        };

        if let Some(ttl) = env::var("PLEXUS_CACHE_TTL_SECS").ok().and_then(|v| v.parse::<u64>().ok()) {
            config.cache.enabled = ttl > 0;
            config.cache.ttl_secs = ttl;
        }
        if let Ok(v) = env::var("PLEXUS_EXPLORATION") {
            config.routing.exploration = flag(&v);
        }
        if let Ok(v) = env::var("PLEXUS_LEARNING") {
            config.learning.enabled = flag(&v);
        }
        if let Some(secs) = env::var("PLEXUS_HEALTH_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()) {
            config.health_check_interval_secs = secs;
        }
        config.store.url = env::var("PLEXUS_DATABASE_URL").ok().filter(|v| !v.is_empty());

        config
    }

    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check router-level settings; per-backend checks happen when adapters are built
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.routing.scoring.validate().map_err(ConfigError::Invalid)?;
        if self.routing.emergency_model.trim().is_empty() {
            return Err(ConfigError::Invalid("routing.emergency_model must not be empty".into()));
        }
        let alpha = self.learning.alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::Invalid(format!("learning.alpha must be in (0, 1], got {alpha}")));
        }
        if self.learning.enabled && self.learning.interval_secs == 0 {
            return Err(ConfigError::Invalid("learning.interval_secs must be > 0".into()));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be > 0".into()));
        }
        Ok(())
    }
}
