//! Router error types

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use plexus_core::{BackendKind, Complexity, ModelKey, TaskCategory};
use plexus_llm::ConfigError;
use plexus_persist::StorageError;

/// One failed or skipped backend attempt during fallback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub backend: BackendKind,
    pub model: String,
    pub reason: String,
}

impl Attempt {
    pub fn new(key: &ModelKey, reason: impl Into<String>) -> Self {
        Self {
            backend: key.backend,
            model: key.model.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.backend, self.model, self.reason)
    }
}

fn join_attempts(attempts: &[Attempt]) -> String {
    attempts
        .iter()
        .map(Attempt::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by routing and the manager
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Backend {backend} is at capacity, retry after {retry_after:?}")]
    Capacity {
        backend: BackendKind,
        retry_after: Duration,
    },

    #[error("No eligible backend for {category} at {complexity} complexity")]
    NoEligibleBackend {
        category: TaskCategory,
        complexity: Complexity,
    },

    #[error("All {} backend attempts failed: {}", .attempts.len(), join_attempts(.attempts))]
    AllBackendsFailed { attempts: Vec<Attempt> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend {0} is not configured")]
    BackendUnavailable(BackendKind),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RouterError {
    /// Whether a caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::Capacity { .. } | RouterError::AllBackendsFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_failed_lists_every_attempt() {
        let err = RouterError::AllBackendsFailed {
            attempts: vec![
                Attempt::new(&ModelKey::new(BackendKind::OpenAi, "gpt-4o"), "HTTP 500"),
                Attempt::new(&ModelKey::new(BackendKind::Ollama, "llama3.1:8b"), "connection refused"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "All 2 backend attempts failed: openai/gpt-4o: HTTP 500; ollama/llama3.1:8b: connection refused"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_capacity_message() {
        let err = RouterError::Capacity {
            backend: BackendKind::Anthropic,
            retry_after: Duration::from_secs(12),
        };
        assert!(err.to_string().contains("anthropic"));
        assert!(!RouterError::InvalidRequest("x".into()).is_retryable());
    }
}
