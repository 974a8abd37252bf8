//! SQLite routing store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use plexus_core::{
    BackendKind, Complexity, ModelCapability, ModelKey, Outcome, RoutingDecision, TaskCategory,
};

use crate::backend::{RoutingStore, StorageError};

/// SQLite configuration options
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database URL (e.g., "sqlite:plexus.db?mode=rwc" or "sqlite::memory:")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Enable WAL journal mode for better concurrency
    pub wal_mode: bool,
    /// Busy timeout in seconds
    pub busy_timeout_secs: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:plexus.db?mode=rwc".to_string(),
            max_connections: 5,
            wal_mode: true,
            busy_timeout_secs: 30,
        }
    }
}

impl SqliteConfig {
    /// Create config for in-memory database (testing).
    ///
    /// A single connection, since every `:memory:` connection is its own database.
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            wal_mode: false,
            busy_timeout_secs: 5,
        }
    }
}

fn query_err(e: sqlx::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

fn corrupt(e: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn millis_to_time(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| corrupt(format!("timestamp out of range: {ms}")))
}

/// SQLite storage backend
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with default config
    pub async fn new(url: &str) -> Result<Self, StorageError> {
        let config = SqliteConfig {
            url: url.to_string(),
            ..Default::default()
        };
        Self::new_with_config(config).await
    }

    /// Create a new SQLite store with full configuration, running migrations
    pub async fn new_with_config(config: SqliteConfig) -> Result<Self, StorageError> {
        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        options = options.pragma("busy_timeout", (config.busy_timeout_secs * 1000).to_string());
        if config.wal_mode {
            options = options.pragma("journal_mode", "WAL");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!(url = %config.url, wal = config.wal_mode, "Connected to SQLite");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::Internal(format!("Migration failed: {}", e)))?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn outcome_from_row(row: &SqliteRow) -> Result<Outcome, StorageError> {
        let backend: String = row.try_get("backend").map_err(query_err)?;
        let category: String = row.try_get("task_category").map_err(query_err)?;
        let complexity: String = row.try_get("complexity").map_err(query_err)?;
        let latency_ms: i64 = row.try_get("latency_ms").map_err(query_err)?;
        let tokens_used: i64 = row.try_get("tokens_used").map_err(query_err)?;

        Ok(Outcome {
            backend: BackendKind::from_str(&backend).map_err(corrupt)?,
            model: row.try_get("model").map_err(query_err)?,
            task_category: TaskCategory::from_str(&category).map_err(corrupt)?,
            complexity: Complexity::from_str(&complexity).map_err(corrupt)?,
            latency_ms: latency_ms.max(0) as u64,
            success: row.try_get("success").map_err(query_err)?,
            cost: row.try_get("cost").map_err(query_err)?,
            tokens_used: tokens_used.clamp(0, u32::MAX as i64) as u32,
            timestamp: millis_to_time(row.try_get("timestamp").map_err(query_err)?)?,
        })
    }

    fn decision_from_row(row: &SqliteRow) -> Result<RoutingDecision, StorageError> {
        let id: String = row.try_get("id").map_err(query_err)?;
        let backend: String = row.try_get("backend").map_err(query_err)?;
        let category: String = row.try_get("task_category").map_err(query_err)?;
        let complexity: String = row.try_get("complexity").map_err(query_err)?;
        let alternatives: String = row.try_get("alternatives").map_err(query_err)?;
        let metadata: String = row.try_get("metadata").map_err(query_err)?;

        Ok(RoutingDecision {
            id: uuid::Uuid::parse_str(&id).map_err(corrupt)?,
            chosen: ModelKey::new(
                BackendKind::from_str(&backend).map_err(corrupt)?,
                row.try_get::<String, _>("model").map_err(query_err)?,
            ),
            confidence: row.try_get("confidence").map_err(query_err)?,
            rationale: row.try_get("rationale").map_err(query_err)?,
            alternatives: from_json(&alternatives)?,
            task_category: TaskCategory::from_str(&category).map_err(corrupt)?,
            complexity: Complexity::from_str(&complexity).map_err(corrupt)?,
            emergency: row.try_get("emergency").map_err(query_err)?,
            metadata: from_json(&metadata)?,
            timestamp: millis_to_time(row.try_get("timestamp").map_err(query_err)?)?,
        })
    }

    fn capability_from_row(row: &SqliteRow) -> Result<ModelCapability, StorageError> {
        let backend: String = row.try_get("backend").map_err(query_err)?;
        let categories: String = row.try_get("task_categories").map_err(query_err)?;
        let max_complexity: String = row.try_get("max_complexity").map_err(query_err)?;
        let specializations: String = row.try_get("specializations").map_err(query_err)?;
        let max_tokens: i64 = row.try_get("max_tokens").map_err(query_err)?;

        Ok(ModelCapability {
            backend: BackendKind::from_str(&backend).map_err(corrupt)?,
            model: row.try_get("model").map_err(query_err)?,
            task_categories: from_json(&categories)?,
            max_complexity: Complexity::from_str(&max_complexity).map_err(corrupt)?,
            function_calling: row.try_get("function_calling").map_err(query_err)?,
            streaming: row.try_get("streaming").map_err(query_err)?,
            max_tokens: max_tokens.clamp(0, u32::MAX as i64) as u32,
            cost_per_1k: row.try_get("cost_per_1k").map_err(query_err)?,
            avg_latency_ms: row.try_get("avg_latency_ms").map_err(query_err)?,
            success_rate: row.try_get("success_rate").map_err(query_err)?,
            specializations: from_json(&specializations)?,
            last_updated: millis_to_time(row.try_get("last_updated").map_err(query_err)?)?,
        })
    }
}

#[async_trait]
impl RoutingStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn is_healthy(&self) -> bool {
        !self.pool.is_closed() && sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn append_outcome(&self, outcome: &Outcome) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO outcomes (backend, model, task_category, complexity, latency_ms, success, cost, tokens_used, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(outcome.backend.as_str())
        .bind(&outcome.model)
        .bind(outcome.task_category.as_str())
        .bind(outcome.complexity.as_str())
        .bind(outcome.latency_ms.min(i64::MAX as u64) as i64)
        .bind(outcome.success)
        .bind(outcome.cost)
        .bind(outcome.tokens_used as i64)
        .bind(outcome.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn outcomes_since(&self, since: DateTime<Utc>) -> Result<Vec<Outcome>, StorageError> {
        let rows = sqlx::query(
            "SELECT backend, model, task_category, complexity, latency_ms, success, cost, tokens_used, timestamp \
             FROM outcomes WHERE timestamp >= ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter().map(Self::outcome_from_row).collect()
    }

    async fn append_decision(&self, decision: &RoutingDecision) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO routing_decisions (id, task_category, complexity, backend, model, confidence, rationale, alternatives, emergency, metadata, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(decision.id.to_string())
        .bind(decision.task_category.as_str())
        .bind(decision.complexity.as_str())
        .bind(decision.chosen.backend.as_str())
        .bind(&decision.chosen.model)
        .bind(decision.confidence)
        .bind(&decision.rationale)
        .bind(to_json(&decision.alternatives)?)
        .bind(decision.emergency)
        .bind(to_json(&decision.metadata)?)
        .bind(decision.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn decisions_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RoutingDecision>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, task_category, complexity, backend, model, confidence, rationale, alternatives, emergency, metadata, timestamp \
             FROM routing_decisions WHERE timestamp >= ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(since.timestamp_millis())
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter().map(Self::decision_from_row).collect()
    }

    async fn save_capabilities(&self, capabilities: &[ModelCapability]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(query_err)?;
        for cap in capabilities {
            sqlx::query(
                "INSERT OR REPLACE INTO capabilities (backend, model, task_categories, max_complexity, function_calling, streaming, max_tokens, cost_per_1k, avg_latency_ms, success_rate, specializations, last_updated) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(cap.backend.as_str())
            .bind(&cap.model)
            .bind(to_json(&cap.task_categories)?)
            .bind(cap.max_complexity.as_str())
            .bind(cap.function_calling)
            .bind(cap.streaming)
            .bind(cap.max_tokens as i64)
            .bind(cap.cost_per_1k)
            .bind(cap.avg_latency_ms)
            .bind(cap.success_rate)
            .bind(to_json(&cap.specializations)?)
            .bind(cap.last_updated.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }
        tx.commit().await.map_err(query_err)?;
        debug!(count = capabilities.len(), "Saved capability snapshot");
        Ok(())
    }

    async fn load_capabilities(&self) -> Result<Vec<ModelCapability>, StorageError> {
        let rows = sqlx::query(
            "SELECT backend, model, task_categories, max_complexity, function_calling, streaming, max_tokens, cost_per_1k, avg_latency_ms, success_rate, specializations, last_updated \
             FROM capabilities ORDER BY backend, model",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter().map(Self::capability_from_row).collect()
    }
}
