//! LLM completion port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::{Message, ToolRequest};

/// Function-style tool definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON-Schema object describing the arguments.
    pub parameters: serde_json::Value,
}

/// Requested shape of the model's text output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// A single JSON object
    Json,
}

/// Input to a single completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// Tools the model may call. Empty forces a text answer.
    pub tools: Vec<ToolSchema>,
    pub timeout: Duration,
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, timeout: Duration) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            timeout,
            response_format: ResponseFormat::Text,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn json(mut self) -> Self {
        self.response_format = ResponseFormat::Json;
        self
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Model output: text, tool requests, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: Option<String>,
    pub tool_requests: Vec<ToolRequest>,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tools(tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            tool_requests,
            ..Self::default()
        }
    }

    /// A completion with no tool requests ends the conversation loop.
    pub fn is_terminal(&self) -> bool {
        self.tool_requests.is_empty()
    }
}

/// Errors from an LLM completion endpoint.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Malformed request (HTTP 400)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid or missing API key (HTTP 401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Unknown model or endpoint (HTTP 404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Server error (HTTP 5xx)
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Response body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Client missing credentials or endpoint
    #[error("LLM client not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Server { .. } | Self::Network(_) | Self::Timeout(_)
        )
    }
}

/// Chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Run one completion. Implementations enforce `request.timeout`.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::RateLimited.is_transient());
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(LlmError::Server {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(!LlmError::Authentication("bad key".to_string()).is_transient());
        assert!(!LlmError::InvalidResponse("garbage".to_string()).is_transient());
    }

    #[test]
    fn test_terminal_completion() {
        assert!(Completion::text("done").is_terminal());
        let request = ToolRequest {
            id: "call_1".to_string(),
            name: "uniprot".to_string(),
            arguments: serde_json::json!({}),
        };
        assert!(!Completion::tools(vec![request]).is_terminal());
    }
}
