//! OpenAI chat completions adapter

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use plexus_core::BackendKind;

use crate::config::{BackendConfig, ConfigError};
use crate::pricing::CostTable;
use crate::provider::{
    check_status, Backend, FinishReason, FunctionCall, LlmError, Request, Response, TextStream,
    Usage,
};
use crate::sse::{sse_data, LineFramer};
use crate::usage::{UsageCounters, UsageSnapshot};

/// OpenAI API request format
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ToolSpec<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolFunctionSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ToolFunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

impl<'a> ChatRequest<'a> {
    fn new(request: &'a Request, model: &'a str, stream: bool) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let params = &request.params;
        Self {
            model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            stop: (!params.stop.is_empty()).then_some(params.stop.as_slice()),
            tools: request
                .functions
                .iter()
                .map(|f| ToolSpec {
                    kind: "function",
                    function: ToolFunctionSpec {
                        name: &f.name,
                        description: &f.description,
                        parameters: &f.parameters,
                    },
                })
                .collect(),
            stream,
        }
    }
}

/// OpenAI API response format
#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: ToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct ToolCallFunction {
    name: String,
    /// JSON-encoded argument object
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// One SSE chunk of a streamed completion
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Adapter for the OpenAI chat completions API
#[derive(Debug)]
pub struct OpenAiBackend {
    api_key: String,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
    costs: CostTable,
    usage: UsageCounters,
}

impl OpenAiBackend {
    /// Build from validated configuration
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let kind = BackendKind::OpenAi;
        config.validate(kind)?;
        Ok(Self {
            api_key: config.api_key.clone().unwrap_or_default(),
            base_url: config.base_url(kind),
            default_model: config.model(kind),
            client: config.http_client()?,
            costs: config.costs(kind),
            usage: UsageCounters::new(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    async fn complete(&self, request: &Request, model: &str) -> Result<Response, LlmError> {
        let start = Instant::now();
        let body = ChatRequest::new(request, model, false);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let api: ChatResponse = check_status(response).await?.json().await?;

        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;
        let usage = api
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        let function_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| FunctionCall::from_encoded(call.function.name, &call.function.arguments))
            .collect();
        let latency_ms = start.elapsed().as_millis() as u64;

        debug!(backend = "openai", model = %api.model, latency_ms, tokens = usage.total_tokens, "Completion finished");

        Ok(Response {
            content: choice.message.content.unwrap_or_default(),
            cost: self.costs.cost(&api.model, &usage),
            backend: BackendKind::OpenAi,
            model: api.model,
            usage,
            latency_ms,
            created_at: Utc::now(),
            request_id: request.id,
            function_calls,
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::from_api)
                .unwrap_or(FinishReason::Stop),
        })
    }

    async fn open_stream(&self, request: &Request, model: &str) -> Result<reqwest::Response, LlmError> {
        let body = ChatRequest::new(request, model, true);
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        check_status(response).await
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(&self, request: &Request, model: &str) -> Result<Response, LlmError> {
        let result = self.complete(request, model).await;
        self.usage.observe(&result);
        result
    }

    async fn stream(&self, request: &Request, model: &str) -> Result<TextStream, LlmError> {
        let response = match self.open_stream(request, model).await {
            Ok(response) => response,
            Err(e) => {
                self.usage.record_error();
                return Err(e);
            }
        };
        self.usage.record_stream_opened();

        let stream = async_stream::stream! {
            let mut body = response.bytes_stream();
            let mut framer = LineFramer::new();

            'read: while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(LlmError::from(e));
                        break;
                    }
                };
                for line in framer.push(&chunk) {
                    let Some(data) = sse_data(&line) else { continue };
                    if data == "[DONE]" {
                        break 'read;
                    }
                    match serde_json::from_str::<StreamChunk>(data) {
                        Ok(parsed) => {
                            for text in parsed.choices.into_iter().filter_map(|c| c.delta.content) {
                                if !text.is_empty() {
                                    yield Ok(text);
                                }
                            }
                        }
                        Err(e) => {
                            yield Err(LlmError::InvalidResponse(e.to_string()));
                            break 'read;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }
}
