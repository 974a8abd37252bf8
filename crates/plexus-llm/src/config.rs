//! Backend configuration
//!
//! Handles API keys, endpoints, timeouts, rate-limit ceilings and cost tables.
//! Validation happens once at startup, never per call.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use plexus_core::BackendKind;

use crate::pricing::CostTable;

/// Error types for configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing credentials for enabled backend {0}")]
    MissingCredentials(BackendKind),
    #[error("Backend {0} is disabled")]
    Disabled(BackendKind),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    /// Override of the backend's public endpoint
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Calls allowed per sliding minute (None = unlimited)
    pub rate_limit_per_minute: Option<u32>,
    pub default_model: Option<String>,
    /// Overrides the built-in rates when non-empty
    pub cost_table: CostTable,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: None,
            timeout_secs: 60,
            rate_limit_per_minute: None,
            default_model: None,
            cost_table: CostTable::new(),
        }
    }
}

impl BackendConfig {
    /// Whether this backend family authenticates with an API key
    pub fn requires_credentials(kind: BackendKind) -> bool {
        !kind.is_local()
    }

    pub fn default_base_url(kind: BackendKind) -> &'static str {
        match kind {
            BackendKind::OpenAi => "https://api.openai.com",
            BackendKind::Anthropic => "https://api.anthropic.com",
            BackendKind::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_model_for(kind: BackendKind) -> &'static str {
        match kind {
            BackendKind::OpenAi => "gpt-4o-mini",
            BackendKind::Anthropic => "claude-3-5-haiku-latest",
            BackendKind::Ollama => "llama3.1:8b",
        }
    }

    pub fn base_url(&self, kind: BackendKind) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| Self::default_base_url(kind).to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn model(&self, kind: BackendKind) -> String {
        self.default_model
            .clone()
            .unwrap_or_else(|| Self::default_model_for(kind).to_string())
    }

    pub fn costs(&self, kind: BackendKind) -> CostTable {
        if self.cost_table.is_empty() {
            CostTable::defaults_for(kind)
        } else {
            self.cost_table.clone()
        }
    }

    /// Check the settings are usable for `kind`
    pub fn validate(&self, kind: BackendKind) -> Result<(), ConfigError> {
        if !self.enabled {
            return Err(ConfigError::Disabled(kind));
        }
        let has_key = self
            .api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false);
        if Self::requires_credentials(kind) && !has_key {
            return Err(ConfigError::MissingCredentials(kind));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(format!("{kind}: timeout_secs must be > 0")));
        }
        if self.rate_limit_per_minute == Some(0) {
            return Err(ConfigError::Invalid(format!(
                "{kind}: rate_limit_per_minute must be > 0 (omit it for no limit)"
            )));
        }
        let url = self.base_url(kind);
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!("{kind}: base_url must be http(s): {url}")));
        }
        Ok(())
    }

    /// HTTP client honouring the configured timeout
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {e}")))
    }

    /// Load settings for one backend from environment variables.
    ///
    /// Reads the vendor key (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`), `OLLAMA_URL`, and
    /// `PLEXUS_<BACKEND>_{ENABLED,BASE_URL,TIMEOUT_SECS,RATE_LIMIT,MODEL}`.
    /// Cloud backends default to enabled only when their key is present.
    pub fn from_env(kind: BackendKind) -> Self {
        let prefix = format!("PLEXUS_{}", kind.as_str().to_uppercase());
        let var = |suffix: &str| env::var(format!("{prefix}_{suffix}")).ok();

        let api_key = match kind {
            BackendKind::OpenAi => env::var("OPENAI_API_KEY").ok(),
            BackendKind::Anthropic => env::var("ANTHROPIC_API_KEY").ok(),
            BackendKind::Ollama => None,
        };
        let base_url = var("BASE_URL").or_else(|| match kind {
            BackendKind::Ollama => env::var("OLLAMA_URL").ok(),
            _ => None,
        });
        let enabled = var("ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(kind.is_local() || api_key.is_some());

        Self {
            enabled,
            api_key,
            base_url,
            timeout_secs: var("TIMEOUT_SECS").and_then(|v| v.parse().ok()).unwrap_or(60),
            rate_limit_per_minute: var("RATE_LIMIT").and_then(|v| v.parse().ok()),
            default_model: var("MODEL"),
            cost_table: CostTable::new(),
        }
    }
}

/// Settings for every backend family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub openai: BackendConfig,
    pub anthropic: BackendConfig,
    pub ollama: BackendConfig,
}

impl BackendsConfig {
    pub fn from_env() -> Self {
        Self {
            openai: BackendConfig::from_env(BackendKind::OpenAi),
            anthropic: BackendConfig::from_env(BackendKind::Anthropic),
            ollama: BackendConfig::from_env(BackendKind::Ollama),
        }
    }

    pub fn get(&self, kind: BackendKind) -> &BackendConfig {
        match kind {
            BackendKind::OpenAi => &self.openai,
            BackendKind::Anthropic => &self.anthropic,
            BackendKind::Ollama => &self.ollama,
        }
    }

    pub fn get_mut(&mut self, kind: BackendKind) -> &mut BackendConfig {
        match kind {
            BackendKind::OpenAi => &mut self.openai,
            BackendKind::Anthropic => &mut self.anthropic,
            BackendKind::Ollama => &mut self.ollama,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_backend_needs_key() {
        let config = BackendConfig::default();
        assert_eq!(
            config.validate(BackendKind::OpenAi),
            Err(ConfigError::MissingCredentials(BackendKind::OpenAi))
        );
        assert!(config.validate(BackendKind::Ollama).is_ok());

        let config = BackendConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(config.validate(BackendKind::Anthropic).is_err());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let config = BackendConfig {
            rate_limit_per_minute: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(BackendKind::Ollama),
            Err(ConfigError::Invalid(_))
        ));

        let config = BackendConfig {
            base_url: Some("localhost:11434".to_string()),
            ..Default::default()
        };
        assert!(config.validate(BackendKind::Ollama).is_err());
    }

    #[test]
    fn test_defaults_resolve_per_backend() {
        let config = BackendConfig {
            base_url: Some("http://gpu-box:11434/".to_string()),
            ..Default::default()
        };
        assert_eq!(config.base_url(BackendKind::Ollama), "http://gpu-box:11434");
        assert_eq!(config.model(BackendKind::Ollama), "llama3.1:8b");
        assert!(!config.costs(BackendKind::OpenAi).is_empty());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BackendsConfig =
            serde_json::from_str(r#"{"openai": {"api_key": "sk-test", "rate_limit_per_minute": 30}}"#)
                .unwrap();
        assert!(config.openai.enabled);
        assert_eq!(config.openai.rate_limit_per_minute, Some(30));
        assert_eq!(config.anthropic.timeout_secs, 60);
    }
}
