//! Routing store trait and error types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Debug;

use plexus_core::{ModelCapability, ModelKey, Outcome, RoutingDecision};

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Durable log of routing decisions and outcomes plus the latest catalog snapshot.
///
/// Outcomes and decisions are append-only; capabilities are upserted by key.
#[async_trait]
pub trait RoutingStore: Send + Sync + Debug {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Check if backend is healthy
    async fn is_healthy(&self) -> bool;

    /// Append one outcome sample
    async fn append_outcome(&self, outcome: &Outcome) -> Result<(), StorageError>;

    /// Outcomes with `timestamp >= since`, oldest first
    async fn outcomes_since(&self, since: DateTime<Utc>) -> Result<Vec<Outcome>, StorageError>;

    /// Append one routing decision
    async fn append_decision(&self, decision: &RoutingDecision) -> Result<(), StorageError>;

    /// Up to `limit` decisions with `timestamp >= since`, newest first
    async fn decisions_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RoutingDecision>, StorageError>;

    /// Insert or replace capability rows by (backend, model)
    async fn save_capabilities(&self, capabilities: &[ModelCapability]) -> Result<(), StorageError>;

    /// Every stored capability
    async fn load_capabilities(&self) -> Result<Vec<ModelCapability>, StorageError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    outcomes: Vec<Outcome>,
    decisions: Vec<RoutingDecision>,
    capabilities: BTreeMap<ModelKey, ModelCapability>,
}

/// In-memory routing store (for testing and ephemeral runs)
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: tokio::sync::RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn outcome_count(&self) -> usize {
        self.state.read().await.outcomes.len()
    }

    pub async fn decision_count(&self) -> usize {
        self.state.read().await.decisions.len()
    }
}

#[async_trait]
impl RoutingStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn append_outcome(&self, outcome: &Outcome) -> Result<(), StorageError> {
        self.state.write().await.outcomes.push(outcome.clone());
        Ok(())
    }

    async fn outcomes_since(&self, since: DateTime<Utc>) -> Result<Vec<Outcome>, StorageError> {
        let state = self.state.read().await;
        let mut outcomes: Vec<Outcome> = state
            .outcomes
            .iter()
            .filter(|o| o.timestamp >= since)
            .cloned()
            .collect();
        outcomes.sort_by_key(|o| o.timestamp);
        Ok(outcomes)
    }

    async fn append_decision(&self, decision: &RoutingDecision) -> Result<(), StorageError> {
        self.state.write().await.decisions.push(decision.clone());
        Ok(())
    }

    async fn decisions_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RoutingDecision>, StorageError> {
        let state = self.state.read().await;
        let mut decisions: Vec<RoutingDecision> = state
            .decisions
            .iter()
            .filter(|d| d.timestamp >= since)
            .cloned()
            .collect();
        decisions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        decisions.truncate(limit);
        Ok(decisions)
    }

    async fn save_capabilities(&self, capabilities: &[ModelCapability]) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        for capability in capabilities {
            state
                .capabilities
                .insert(capability.key(), capability.clone());
        }
        Ok(())
    }

    async fn load_capabilities(&self) -> Result<Vec<ModelCapability>, StorageError> {
        Ok(self.state.read().await.capabilities.values().cloned().collect())
    }
}
