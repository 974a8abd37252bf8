//! # Plexus LLM
//!
//! Backend adapters behind one [`Backend`] trait.
//!
//! ## Supported Backends
//!
//! | Backend | Type | Key Required |
//! |---------|------|--------------|
//! | OpenAI | API | `OPENAI_API_KEY` |
//! | Anthropic | API | `ANTHROPIC_API_KEY` |
//! | Ollama | Local | None (`OLLAMA_URL`) |
//! | Mock | Testing | None |
//!
//! Adapters translate the canonical [`Request`] into each backend's wire format, compute
//! cost from a [`CostTable`], keep their own [`UsageSnapshot`] counters and never retry.
//!
//! ## Quick Start
//!
//! ```rust
//! use plexus_core::BackendKind;
//! use plexus_llm::{Backend, MockBackend, Request};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MockBackend::constant(BackendKind::Ollama, "Hello!");
//!     let response = backend
//!         .generate(&Request::new("Say hello"), backend.default_model())
//!         .await
//!         .unwrap();
//!     assert_eq!(response.content, "Hello!");
//! }
//! ```
//!
//! ## With OpenAI
//!
//! ```rust,ignore
//! use plexus_core::BackendKind;
//! use plexus_llm::{build_backend, BackendConfig};
//!
//! let config = BackendConfig::from_env(BackendKind::OpenAi);
//! let backend = build_backend(BackendKind::OpenAi, &config)?;
//! ```

use std::sync::Arc;

pub mod anthropic;
pub mod config;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod pricing;
pub mod provider;
mod sse;
pub mod usage;

pub use anthropic::AnthropicBackend;
pub use config::{BackendConfig, BackendsConfig, ConfigError};
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use pricing::{CostTable, ModelRate};
pub use provider::{
    Backend, FinishReason, FunctionCall, FunctionDecl, GenerationParams, LlmError, Request,
    Response, TextStream, Usage,
};
pub use usage::{UsageCounters, UsageSnapshot};

use plexus_core::BackendKind;

/// Build the adapter for `kind`, validating its configuration first
pub fn build_backend(kind: BackendKind, config: &BackendConfig) -> Result<Arc<dyn Backend>, ConfigError> {
    let backend: Arc<dyn Backend> = match kind {
        BackendKind::OpenAi => Arc::new(OpenAiBackend::from_config(config)?),
        BackendKind::Anthropic => Arc::new(AnthropicBackend::from_config(config)?),
        BackendKind::Ollama => Arc::new(OllamaBackend::from_config(config)?),
    };
    Ok(backend)
}
