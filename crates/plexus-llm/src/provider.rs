//! Backend trait and the canonical request/response contract

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

use plexus_core::BackendKind;

use crate::usage::UsageSnapshot;

/// Errors from backend adapters
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Network failure or timeout talking to the backend
    #[error("Transport error: {0}")]
    Transport(String),
    /// Backend answered with a non-success status
    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Backend answered 429
    #[error("Rate limited by backend")]
    RateLimited,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LlmError {
    /// Network-level failure (connect, timeout, broken body)
    pub fn is_transport(&self) -> bool {
        matches!(self, LlmError::Transport(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LlmError::InvalidResponse(e.to_string())
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}

/// Sampling parameters, mapped onto each backend's native names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub max_tokens: u32,
    /// 0.0 = deterministic, 1.0 = creative
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub stop: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stop: Vec::new(),
        }
    }
}

/// A function/tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: serde_json::Value,
}

impl FunctionDecl {
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// A function call emitted by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl FunctionCall {
    /// Build from a JSON-encoded argument string; unparsable text is kept verbatim
    pub fn from_encoded(name: String, arguments: &str) -> Self {
        let arguments = serde_json::from_str(arguments)
            .unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()));
        Self { name, arguments }
    }
}

/// A text-generation request.
///
/// Adapters and the manager only ever borrow it, so it is immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub prompt: String,
    /// System prompt (role/persona)
    pub system: Option<String>,
    /// Explicit backend pin; bypasses routing
    pub backend: Option<BackendKind>,
    /// Explicit model pin (used with `backend`)
    pub model: Option<String>,
    pub params: GenerationParams,
    pub functions: Vec<FunctionDecl>,
    pub stream: bool,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Free-form metadata; may carry routing hints such as `privacy_sensitive`
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Request {
    /// Create a request with default generation settings
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            system: None,
            backend: None,
            model: None,
            params: GenerationParams::default(),
            functions: Vec::new(),
            stream: false,
            user_id: None,
            session_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Pin the request to a backend, optionally to a specific model
    pub fn pinned(mut self, backend: BackendKind, model: Option<&str>) -> Self {
        self.backend = Some(backend);
        self.model = model.map(str::to_string);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.params.top_p = top_p;
        self
    }

    pub fn with_stop(mut self, stop: &str) -> Self {
        self.params.stop.push(stop.to_string());
        self
    }

    pub fn with_function(mut self, function: FunctionDecl) -> Self {
        self.functions.push(function);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn with_user(mut self, user_id: &str, session_id: Option<&str>) -> Self {
        self.user_id = Some(user_id.to_string());
        self.session_id = session_id.map(str::to_string);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Token accounting for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Why generation stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    FunctionCall,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Normalise the finish/stop reason strings used by the supported backends
    pub fn from_api(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "stop_sequence" => FinishReason::Stop,
            "length" | "max_tokens" => FinishReason::Length,
            "tool_calls" | "function_call" | "tool_use" => FinishReason::FunctionCall,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// Canonical response, identical in shape for every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The generated text
    pub content: String,
    pub backend: BackendKind,
    /// Model that actually served the request
    pub model: String,
    pub usage: Usage,
    /// Cost in USD
    pub cost: f64,
    /// Time taken in milliseconds
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
    pub request_id: Uuid,
    pub function_calls: Vec<FunctionCall>,
    pub finish_reason: FinishReason,
}

/// Incremental, in-order, finite text fragments of one streamed response.
///
/// Dropping the stream drops the underlying HTTP body, so no further reads happen.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Trait implemented by every backend adapter.
///
/// Adapters translate requests, compute cost and keep their own usage counters.
/// They never retry; retries and fallback belong to the caller.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Which provider family this adapter talks to
    fn kind(&self) -> BackendKind;

    /// Model used when a request pins the backend but not the model
    fn default_model(&self) -> &str;

    /// Generate a complete response
    async fn generate(&self, request: &Request, model: &str) -> Result<Response, LlmError>;

    /// Open a streaming response
    async fn stream(&self, request: &Request, model: &str) -> Result<TextStream, LlmError>;

    /// Generate with declared functions, returning any calls the model made
    async fn call_function(&self, request: &Request, model: &str) -> Result<Response, LlmError> {
        if request.functions.is_empty() {
            return Err(LlmError::Unsupported(
                "call_function requires at least one function declaration".to_string(),
            ));
        }
        self.generate(request, model).await
    }

    /// Cheap liveness probe
    async fn health_check(&self) -> bool;

    /// Counters accumulated by this adapter
    fn usage(&self) -> UsageSnapshot;
}

/// Map a non-success HTTP status onto a typed error
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Status {
        status: status.as_u16(),
        body,
    })
}
