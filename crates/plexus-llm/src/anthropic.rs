//! Anthropic messages API adapter

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

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [UserMessage<'a>; 1],
    /// The messages API accepts 0.0..=1.0 only
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ToolSpec<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

impl<'a> MessagesRequest<'a> {
    fn new(request: &'a Request, model: &'a str, stream: bool) -> Self {
        let params = &request.params;
        Self {
            model,
            max_tokens: params.max_tokens,
            system: request.system.as_deref(),
            messages: [UserMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: params.temperature.clamp(0.0, 1.0),
            top_p: params.top_p,
            stop_sequences: (!params.stop.is_empty()).then_some(params.stop.as_slice()),
            tools: request
                .functions
                .iter()
                .map(|f| ToolSpec {
                    name: &f.name,
                    description: &f.description,
                    input_schema: &f.parameters,
                })
                .collect(),
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { name: String, input: serde_json::Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Server-sent event payloads we care about while streaming
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: ApiErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Adapter for the Anthropic messages API
#[derive(Debug)]
pub struct AnthropicBackend {
    api_key: String,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
    costs: CostTable,
    usage: UsageCounters,
}

impl AnthropicBackend {
    /// Build from validated configuration
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let kind = BackendKind::Anthropic;
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

    async fn post(&self, body: &MessagesRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn complete(&self, request: &Request, model: &str) -> Result<Response, LlmError> {
        let start = Instant::now();
        let body = MessagesRequest::new(request, model, false);
        let api: MessagesResponse = self.post(&body).await?.json().await?;

        let mut content = String::new();
        let mut function_calls = Vec::new();
        for block in api.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { name, input } => function_calls.push(FunctionCall {
                    name,
                    arguments: input,
                }),
                ContentBlock::Other => {}
            }
        }

        let usage = Usage::new(api.usage.input_tokens, api.usage.output_tokens);
        let latency_ms = start.elapsed().as_millis() as u64;
        debug!(backend = "anthropic", model = %api.model, latency_ms, tokens = usage.total_tokens, "Completion finished");

        Ok(Response {
            content,
            cost: self.costs.cost(&api.model, &usage),
            backend: BackendKind::Anthropic,
            model: api.model,
            usage,
            latency_ms,
            created_at: Utc::now(),
            request_id: request.id,
            function_calls,
            finish_reason: api
                .stop_reason
                .as_deref()
                .map(FinishReason::from_api)
                .unwrap_or(FinishReason::Stop),
        })
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Anthropic
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
        let body = MessagesRequest::new(request, model, true);
        let response = match self.post(&body).await {
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
                    match serde_json::from_str::<StreamEvent>(data) {
                        Ok(StreamEvent::ContentBlockDelta { delta: Delta::TextDelta { text } }) => {
                            yield Ok(text);
                        }
                        Ok(StreamEvent::MessageStop) => break 'read,
                        Ok(StreamEvent::Error { error }) => {
                            let err = if error.kind == "overloaded_error" || error.kind == "rate_limit_error" {
                                LlmError::RateLimited
                            } else {
                                LlmError::InvalidResponse(format!("{}: {}", error.kind, error.message))
                            };
                            yield Err(err);
                            break 'read;
                        }
                        Ok(_) => {}
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
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .send()
            .await;
        matches!(response, Ok(r) if r.status().is_success())
    }

    fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FunctionDecl;

    #[test]
    fn test_request_body_shape() {
        let request = Request::new("Summarise this")
            .with_system("You are an editor")
            .with_temperature(1.5)
            .with_function(FunctionDecl::new("save", "Save a note", serde_json::json!({"type": "object"})));
        let body = serde_json::to_value(MessagesRequest::new(&request, "claude-3-haiku", false)).unwrap();

        assert_eq!(body["system"], "You are an editor");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["temperature"], 1.0);
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert!(body.get("stop_sequences").is_none());
    }

    #[test]
    fn test_content_blocks_parse() {
        let raw = serde_json::json!({
            "model": "claude-3-haiku-20240307",
            "content": [
                {"type": "text", "text": "Saving."},
                {"type": "tool_use", "id": "tu_1", "name": "save", "input": {"note": "x"}},
                {"type": "thinking", "thinking": "..."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 7}
        });
        let parsed: MessagesResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.content.len(), 3);
        assert!(matches!(parsed.content[1], ContentBlock::ToolUse { .. }));
        assert!(matches!(parsed.content[2], ContentBlock::Other));
    }

    #[test]
    fn test_stream_events_parse() {
        let delta: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap();
        assert!(matches!(delta, StreamEvent::ContentBlockDelta { delta: Delta::TextDelta { .. } }));

        let ping: StreamEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, StreamEvent::Other));
    }

    #[tokio::test]
    #[ignore = "Requires ANTHROPIC_API_KEY"]
    async fn test_anthropic_live() {
        let config = BackendConfig::from_env(BackendKind::Anthropic);
        let backend = AnthropicBackend::from_config(&config).unwrap();
        let response = backend
            .generate(&Request::new("Say hello in one word").with_max_tokens(8), "claude-3-haiku-20240307")
            .await
            .unwrap();
        assert!(!response.content.is_empty());
    }
}
