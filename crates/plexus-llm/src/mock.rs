//! Mock backend for testing

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use plexus_core::BackendKind;

use crate::provider::{
    Backend, FinishReason, FunctionCall, LlmError, Request, Response, TextStream, Usage,
};
use crate::usage::{UsageCounters, UsageSnapshot};

/// A scriptable backend that impersonates one provider family.
///
/// Cycles through canned responses, or fails every call with a fixed error.
/// Counts every invocation so tests can assert how often a backend was hit.
#[derive(Debug)]
pub struct MockBackend {
    kind: BackendKind,
    default_model: String,
    /// Canned responses (cycles through them)
    responses: Vec<String>,
    index: AtomicUsize,
    failure: Option<LlmError>,
    latency: Duration,
    /// Pause before each streamed fragment
    fragment_delay: Duration,
    fragments_sent: Arc<AtomicUsize>,
    calls: AtomicUsize,
    healthy: AtomicBool,
    usage: UsageCounters,
}

impl MockBackend {
    /// Create a mock with the given responses
    pub fn new(kind: BackendKind, responses: Vec<String>) -> Self {
        Self {
            kind,
            default_model: format!("{}-mock", kind.as_str()),
            responses,
            index: AtomicUsize::new(0),
            failure: None,
            latency: Duration::from_millis(10),
            fragment_delay: Duration::ZERO,
            fragments_sent: Arc::new(AtomicUsize::new(0)),
            calls: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
            usage: UsageCounters::new(),
        }
    }

    /// Create a mock that always returns the same response
    pub fn constant(kind: BackendKind, response: &str) -> Self {
        Self::new(kind, vec![response.to_string()])
    }

    /// Create a mock whose every call fails with `error`
    pub fn failing(kind: BackendKind, error: LlmError) -> Self {
        let mut mock = Self::new(kind, Vec::new());
        mock.failure = Some(error);
        mock.healthy = AtomicBool::new(false);
        mock
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }

    /// Simulated latency per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Pace streamed fragments; each is produced only when the consumer polls for it
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    /// Fragments produced across all streams so far
    pub fn fragments_sent(&self) -> usize {
        self.fragments_sent.load(Ordering::SeqCst)
    }

    /// Number of generate/stream/call_function invocations so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn next_text(&self, request: &Request) -> String {
        if self.responses.is_empty() {
            return format!("mock reply to: {}", request.prompt);
        }
        let idx = self.index.fetch_add(1, Ordering::SeqCst) % self.responses.len();
        self.responses[idx].clone()
    }

    /// Count the call, wait out the simulated latency, and surface the scripted failure
    async fn begin(&self) -> Result<Instant, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        tokio::time::sleep(self.latency).await;
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(start),
        }
    }

    fn respond(
        &self,
        request: &Request,
        model: &str,
        content: String,
        start: Instant,
        function_calls: Vec<FunctionCall>,
    ) -> Response {
        let prompt_tokens = request.prompt.split_whitespace().count() as u32;
        let completion_tokens = content.split_whitespace().count() as u32;
        let finish_reason = if function_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::FunctionCall
        };
        Response {
            content,
            backend: self.kind,
            model: model.to_string(),
            usage: Usage::new(prompt_tokens, completion_tokens),
            cost: 0.0,
            latency_ms: start.elapsed().as_millis() as u64,
            created_at: Utc::now(),
            request_id: request.id,
            function_calls,
            finish_reason,
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(&self, request: &Request, model: &str) -> Result<Response, LlmError> {
        let result = match self.begin().await {
            Ok(start) => {
                let content = self.next_text(request);
                Ok(self.respond(request, model, content, start, Vec::new()))
            }
            Err(e) => Err(e),
        };
        self.usage.observe(&result);
        result
    }

    async fn stream(&self, request: &Request, _model: &str) -> Result<TextStream, LlmError> {
        if let Err(e) = self.begin().await {
            self.usage.record_error();
            return Err(e);
        }
        self.usage.record_stream_opened();

        let words: Vec<String> = self
            .next_text(request)
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        let delay = self.fragment_delay;
        let sent = Arc::clone(&self.fragments_sent);

        let stream: TextStream = Box::pin(async_stream::stream! {
            for word in words {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                sent.fetch_add(1, Ordering::SeqCst);
                yield Ok::<String, LlmError>(word);
            }
        });
        Ok(stream)
    }

    async fn call_function(&self, request: &Request, model: &str) -> Result<Response, LlmError> {
        let Some(function) = request.functions.first() else {
            return Err(LlmError::Unsupported(
                "call_function requires at least one function declaration".to_string(),
            ));
        };
        let result = match self.begin().await {
            Ok(start) => {
                let call = FunctionCall {
                    name: function.name.clone(),
                    arguments: serde_json::json!({}),
                };
                Ok(self.respond(request, model, String::new(), start, vec![call]))
            }
            Err(e) => Err(e),
        };
        self.usage.observe(&result);
        result
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FunctionDecl;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_mock_cycles_responses() {
        let mock = MockBackend::new(BackendKind::OpenAi, vec!["one".into(), "two".into()])
            .with_latency(Duration::ZERO);
        let request = Request::new("hi");

        assert_eq!(mock.generate(&request, "m").await.unwrap().content, "one");
        assert_eq!(mock.generate(&request, "m").await.unwrap().content, "two");
        assert_eq!(mock.generate(&request, "m").await.unwrap().content, "one");
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.usage().requests, 3);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let mock = MockBackend::failing(BackendKind::Anthropic, LlmError::Transport("down".into()))
            .with_latency(Duration::ZERO);
        let err = mock.generate(&Request::new("hi"), "m").await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(mock.usage().errors, 1);
        assert!(!mock.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_stream_yields_words() {
        let mock = MockBackend::constant(BackendKind::Ollama, "hello streaming world")
            .with_latency(Duration::ZERO);
        let fragments: Vec<String> = mock
            .stream(&Request::new("hi"), "m")
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["hello ", "streaming ", "world"]);
        assert_eq!(mock.fragments_sent(), 3);
    }

    #[tokio::test]
    async fn test_mock_function_call() {
        let mock = MockBackend::constant(BackendKind::OpenAi, "unused").with_latency(Duration::ZERO);
        let request = Request::new("weather in Oslo?").with_function(FunctionDecl::new(
            "get_weather",
            "Look up weather",
            serde_json::json!({"type": "object"}),
        ));
        let response = mock.call_function(&request, "m").await.unwrap();
        assert_eq!(response.function_calls[0].name, "get_weather");
        assert_eq!(response.finish_reason, FinishReason::FunctionCall);

        let err = mock.call_function(&Request::new("no tools"), "m").await.unwrap_err();
        assert!(matches!(err, LlmError::Unsupported(_)));
        assert_eq!(mock.calls(), 1);
    }
}
