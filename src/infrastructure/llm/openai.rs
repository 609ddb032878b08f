//! OpenAI-compatible chat-completions client.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect
//! (OpenAI, Azure-style proxies, vLLM, Ollama's compatibility layer).

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::domain::models::{LlmConfig, Message, Role, ToolRequest};
use crate::domain::ports::{
    Completion, CompletionRequest, LlmClient, LlmError, ResponseFormat, TokenUsage, ToolSchema,
};
use crate::infrastructure::resilience::RetryPolicy;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

fn to_wire(message: &Message) -> WireMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let tool_calls: Vec<WireToolCall> = message
        .tool_requests
        .iter()
        .map(|r| WireToolCall {
            id: r.id.clone(),
            call_type: function_type(),
            function: WireFunction {
                name: r.name.clone(),
                arguments: r.arguments.to_string(),
            },
        })
        .collect();
    let content = if message.content.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(message.content.clone())
    };
    WireMessage {
        role,
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn from_wire(call: WireToolCall) -> ToolRequest {
    // Unparseable argument strings are passed through; schema validation rejects them later.
    let arguments = serde_json::from_str(&call.function.arguments)
        .unwrap_or(Value::String(call.function.arguments));
    ToolRequest {
        id: call.id,
        name: call.function.name,
        arguments,
    }
}

fn map_status(status: StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Authentication(body),
        404 => LlmError::NotFound(body),
        429 => LlmError::RateLimited,
        code if code >= 500 => LlmError::Server {
            status: code,
            message: body,
        },
        _ => LlmError::InvalidRequest(format!("{status}: {body}")),
    }
}

/// Chat-completions client with retry on transient failures.
pub struct OpenAiClient {
    config: LlmConfig,
    client: Client,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;
        let retry = RetryPolicy::from_config(&config.retry);
        Ok(Self {
            config,
            client,
            retry,
        })
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let tools: Vec<WireTool<'a>> = request
            .tools
            .iter()
            .map(|function| WireTool {
                tool_type: "function",
                function,
            })
            .collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");
        let response_format = match request.response_format {
            ResponseFormat::Json => Some(serde_json::json!({"type": "json_object"})),
            ResponseFormat::Text => None,
        };

        ChatRequest {
            model: &self.config.model,
            messages: request.messages.iter().map(to_wire).collect(),
            tools,
            tool_choice,
            response_format,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    async fn send(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let api_key = self
            .config
            .resolved_api_key()
            .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY not set".to_string()))?;

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(request.timeout)
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        Ok(Completion {
            text: choice.message.content.filter(|t| !t.trim().is_empty()),
            tool_requests: choice.message.tool_calls.into_iter().map(from_wire).collect(),
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %self.config.model, messages = request.messages.len(), tools = request.tools.len()))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let completion = self.retry.execute(|| self.send(&request)).await?;
        debug!(
            tool_requests = completion.tool_requests.len(),
            has_text = completion.text.is_some(),
            "completion received"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RetryConfig;
    use serde_json::json;
    use std::time::Duration;

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
                multiplier: 2.0,
            },
            ..LlmConfig::default()
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![Message::user("hello")], Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_text_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{"message": {"role": "assistant", "content": "BRCA1 binds BARD1."}}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OpenAiClient::new(config(server.url())).unwrap();
        let completion = client.complete(request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(completion.text.as_deref(), Some("BRCA1 binds BARD1."));
        assert!(completion.is_terminal());
        assert_eq!(completion.usage.unwrap().total(), 15);
    }

    #[tokio::test]
    async fn test_tool_call_arguments_are_decoded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{"message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "uniprot", "arguments": "{\"protein_id\":\"BRCA1\"}"}
                        }]
                    }}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OpenAiClient::new(config(server.url())).unwrap();
        let completion = client.complete(request()).await.unwrap();

        assert_eq!(completion.text, None);
        assert_eq!(completion.tool_requests.len(), 1);
        assert_eq!(completion.tool_requests[0].name, "uniprot");
        assert_eq!(completion.tool_requests[0].arguments["protein_id"], "BRCA1");
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("bad key")
            .expect(1)
            .create_async()
            .await;

        let client = OpenAiClient::new(config(server.url())).unwrap();
        let err = client.complete(request()).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, LlmError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_retried_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .expect(3)
            .create_async()
            .await;

        let client = OpenAiClient::new(config(server.url())).unwrap();
        let err = client.complete(request()).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, LlmError::Server { status: 503, .. }));
    }

    #[test]
    fn test_wire_format_of_tool_messages() {
        let assistant = Message::assistant_with_tools(
            "",
            vec![ToolRequest {
                id: "call_9".to_string(),
                name: "string".to_string(),
                arguments: json!({"proteins": ["BRCA1"]}),
            }],
        );
        let wire = serde_json::to_value(to_wire(&assistant)).unwrap();
        assert_eq!(wire["role"], "assistant");
        assert!(wire.get("content").is_none());
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], "{\"proteins\":[\"BRCA1\"]}");

        let tool = serde_json::to_value(to_wire(&Message::tool("call_9", "{}"))).unwrap();
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_9");
    }
}
