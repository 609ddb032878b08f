//! Tool call and tool result domain models.
//!
//! A `ToolCall` is one planned invocation of a source connector. Its status
//! only moves forward: `Pending -> Running -> Succeeded | Failed`, or
//! `Pending -> Skipped | Failed` when it never gets to run.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::source::SourceId;
use crate::domain::errors::{DomainError, DomainResult};

/// Status of a planned source invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Waiting for a dependency or a concurrency slot
    Pending,
    /// Connector invocation in flight
    Running,
    /// Payload received
    Succeeded,
    /// Failed after retries, rejected arguments, or ran out of time
    Failed,
    /// Not invoked because a prerequisite call failed
    Skipped,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<CallStatus> {
        match self {
            Self::Pending => vec![Self::Running, Self::Failed, Self::Skipped],
            Self::Running => vec![Self::Succeeded, Self::Failed],
            Self::Succeeded | Self::Failed | Self::Skipped => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned invocation of a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub source: SourceId,
    pub arguments: serde_json::Value,
    pub status: CallStatus,
    /// Index of the call in the same batch whose result this call's arguments depend on.
    pub depends_on: Option<usize>,
    /// Correlation id of the LLM tool request that produced this call, if any.
    pub request_id: Option<String>,
}

impl ToolCall {
    pub fn new(source: SourceId, arguments: serde_json::Value) -> Self {
        Self {
            source,
            arguments,
            status: CallStatus::Pending,
            depends_on: None,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Move to a new status, rejecting backwards or sideways moves.
    pub fn transition_to(&mut self, new_status: CallStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: new_status,
            });
        }
        self.status = new_status;
        Ok(())
    }
}

/// Why a call did not produce a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidArgument,
    Timeout,
    RateLimited,
    UpstreamError,
    DependencyFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::UpstreamError => "upstream_error",
            Self::DependencyFailed => "dependency_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last error recorded for a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ToolFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Payload or error of a finished call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum ToolOutcome {
    Payload(serde_json::Value),
    Error(ToolFailure),
}

/// Outcome of one planned call. Exactly one exists per `ToolCall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub source: SourceId,
    /// Terminal status of the originating call.
    pub status: CallStatus,
    pub outcome: ToolOutcome,
    /// Payload was condensed to fit the context window or token budget.
    pub truncated: bool,
    pub elapsed_ms: u64,
    /// Connector invocations made (0 when skipped, rejected or served from cache).
    pub attempts: u32,
    pub request_id: Option<String>,
}

impl ToolResult {
    pub fn succeeded(&self) -> bool {
        self.status == CallStatus::Succeeded
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            ToolOutcome::Payload(value) => Some(value),
            ToolOutcome::Error(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ToolFailure> {
        match &self.outcome {
            ToolOutcome::Payload(_) => None,
            ToolOutcome::Error(failure) => Some(failure),
        }
    }

    /// Render the result as the content of a tool message.
    pub fn to_message_content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Payload(value) => match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            },
            ToolOutcome::Error(failure) => serde_json::json!({
                "source": self.source,
                "status": self.status,
                "error": failure.message,
                "kind": failure.kind,
            })
            .to_string(),
        }
    }
}
