//! Ollama adapter for local inference

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
use crate::sse::LineFramer;
use crate::usage::{UsageCounters, UsageSnapshot};

/// Ollama API request format
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: Options<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options<'a> {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    frequency_penalty: f32,
    presence_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
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
            stream,
            options: Options {
                temperature: params.temperature,
                top_p: params.top_p,
                num_predict: params.max_tokens,
                frequency_penalty: params.frequency_penalty,
                presence_penalty: params.presence_penalty,
                stop: (!params.stop.is_empty()).then_some(params.stop.as_slice()),
            },
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
        }
    }
}

/// Ollama API response format; streamed lines share the same shape
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
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
    /// Ollama returns arguments as a JSON object, not an encoded string
    arguments: serde_json::Value,
}

/// Adapter for a locally hosted Ollama server
#[derive(Debug)]
pub struct OllamaBackend {
    base_url: String,
    default_model: String,
    client: reqwest::Client,
    costs: CostTable,
    usage: UsageCounters,
}

impl OllamaBackend {
    /// Build from validated configuration
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let kind = BackendKind::Ollama;
        config.validate(kind)?;
        Ok(Self {
            base_url: config.base_url(kind),
            default_model: config.model(kind),
            client: config.http_client()?,
            costs: config.costs(kind),
            usage: UsageCounters::new(),
        })
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn complete(&self, request: &Request, model: &str) -> Result<Response, LlmError> {
        let start = Instant::now();
        let body = ChatRequest::new(request, model, false);
        let api: ChatResponse = self.post(&body).await?.json().await?;

        if let Some(error) = api.error {
            return Err(LlmError::InvalidResponse(error));
        }
        let message = api
            .message
            .ok_or_else(|| LlmError::InvalidResponse("missing message".to_string()))?;
        let usage = Usage::new(api.prompt_eval_count.unwrap_or(0), api.eval_count.unwrap_or(0));
        let function_calls: Vec<FunctionCall> = message
            .tool_calls
            .into_iter()
            .map(|call| FunctionCall {
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();
        let latency_ms = start.elapsed().as_millis() as u64;
        debug!(backend = "ollama", model = %api.model, latency_ms, tokens = usage.total_tokens, "Completion finished");

        let finish_reason = if function_calls.is_empty() {
            api.done_reason
                .as_deref()
                .map(FinishReason::from_api)
                .unwrap_or(FinishReason::Stop)
        } else {
            FinishReason::FunctionCall
        };

        Ok(Response {
            content: message.content,
            cost: self.costs.cost(&api.model, &usage),
            backend: BackendKind::Ollama,
            model: api.model,
            usage,
            latency_ms,
            created_at: Utc::now(),
            request_id: request.id,
            function_calls,
            finish_reason,
        })
    }
}

/// Parse one NDJSON line of a streamed reply into (fragment, done)
fn parse_stream_line(line: &str) -> Result<(Option<String>, bool), LlmError> {
    let parsed: ChatResponse =
        serde_json::from_str(line).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    if let Some(error) = parsed.error {
        return Err(LlmError::InvalidResponse(error));
    }
    let text = parsed
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty());
    Ok((text, parsed.done))
}

#[async_trait]
impl Backend for OllamaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
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
        let body = ChatRequest::new(request, model, true);
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
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_stream_line(&line) {
                        Ok((text, done)) => {
                            if let Some(text) = text {
                                yield Ok(text);
                            }
                            if done {
                                break 'read;
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            break 'read;
                        }
                    }
                }
            }
            if let Some(line) = framer.finish() {
                if let Ok((Some(text), _)) = parse_stream_line(&line) {
                    yield Ok(text);
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_mapping() {
        let request = Request::new("hello")
            .with_max_tokens(200)
            .with_temperature(0.2)
            .with_stop("END");
        let body = serde_json::to_value(ChatRequest::new(&request, "llama3.1:8b", false)).unwrap();

        assert_eq!(body["options"]["num_predict"], 200);
        assert_eq!(body["options"]["stop"][0], "END");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_stream_line_parsing() {
        let (text, done) = parse_stream_line(
            r#"{"model":"llama3.1:8b","message":{"role":"assistant","content":"Hel"},"done":false}"#,
        )
        .unwrap();
        assert_eq!(text.as_deref(), Some("Hel"));
        assert!(!done);

        let (text, done) = parse_stream_line(
            r#"{"model":"llama3.1:8b","message":{"role":"assistant","content":""},"done":true,"eval_count":3}"#,
        )
        .unwrap();
        assert!(text.is_none());
        assert!(done);

        assert!(parse_stream_line(r#"{"model":"x","error":"model not found"}"#).is_err());
    }

    #[test]
    fn test_no_credentials_needed() {
        let backend = OllamaBackend::from_config(&BackendConfig::default()).unwrap();
        assert_eq!(backend.default_model(), "llama3.1:8b");
    }

    #[tokio::test]
    #[ignore = "Requires Ollama running locally"]
    async fn test_ollama_live() {
        let backend = OllamaBackend::from_config(&BackendConfig::from_env(BackendKind::Ollama)).unwrap();
        if backend.health_check().await {
            let response = backend
                .generate(&Request::new("Say hello in one word"), backend.default_model())
                .await
                .unwrap();
            assert!(!response.content.is_empty());
        }
    }
}
