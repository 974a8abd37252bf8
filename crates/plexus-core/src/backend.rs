//! Backend identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A provider family Plexus knows how to talk to.
///
/// The set is closed: every variant has exactly one adapter in `plexus-llm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// OpenAI chat completions API
    OpenAi,
    /// Anthropic messages API
    Anthropic,
    /// Locally hosted Ollama inference engine
    Ollama,
}

impl BackendKind {
    /// All backend kinds, in a stable order
    pub const ALL: [BackendKind; 3] = [BackendKind::OpenAi, BackendKind::Anthropic, BackendKind::Ollama];

    /// Stable lowercase identifier used in storage and config
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Anthropic => "anthropic",
            BackendKind::Ollama => "ollama",
        }
    }

    /// Whether requests stay on infrastructure the operator controls
    pub fn is_local(&self) -> bool {
        matches!(self, BackendKind::Ollama)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a backend name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown backend: {0}")]
pub struct ParseBackendError(pub String);

impl FromStr for BackendKind {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "open_ai" => Ok(BackendKind::OpenAi),
            "anthropic" | "claude" => Ok(BackendKind::Anthropic),
            "ollama" | "local" => Ok(BackendKind::Ollama),
            other => Err(ParseBackendError(other.to_string())),
        }
    }
}

/// Unique key of a catalog entry: one model served by one backend
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub backend: BackendKind,
    pub model: String,
}

impl ModelKey {
    pub fn new(backend: BackendKind, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.backend, self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_roundtrip_names() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.as_str().parse::<BackendKind>().unwrap(), kind);
        }
        assert!("bedrock".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_only_ollama_is_local() {
        assert!(BackendKind::Ollama.is_local());
        assert!(!BackendKind::OpenAi.is_local());
        assert!(!BackendKind::Anthropic.is_local());
    }

    #[test]
    fn test_model_key_display() {
        let key = ModelKey::new(BackendKind::Anthropic, "claude-3-haiku");
        assert_eq!(key.to_string(), "anthropic/claude-3-haiku");
    }
}
