//! Conversation state for one in-flight query.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::source::SourceId;
use super::tool_call::{ToolOutcome, ToolResult};

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Correlation id echoed back on the tool message.
    pub id: String,
    /// Tool (source) name as the LLM wrote it.
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool requests made by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_requests: Vec<ToolRequest>,
    /// The request a tool message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_requests,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_requests: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_requests: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Characters that count against the context window.
    pub fn char_len(&self) -> usize {
        let requests: usize = self
            .tool_requests
            .iter()
            .map(|r| r.name.len() + r.arguments.to_string().len())
            .sum();
        self.content.len() + requests
    }
}

/// Phase of the controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerPhase {
    Idle,
    Analyzing,
    Routing,
    Executing,
    Synthesizing,
    Done,
    Failed,
}

impl ControllerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Analyzing => "analyzing",
            Self::Routing => "routing",
            Self::Executing => "executing",
            Self::Synthesizing => "synthesizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ControllerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool result attached to the conversation, with the message carrying it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedResult {
    pub result: ToolResult,
    /// Index into `ConversationState::messages`.
    pub message_index: usize,
    /// Round in which the result was attached.
    pub round: u32,
}

/// Mutable state of one query's conversation.
///
/// Owned by exactly one controller invocation; never shared across queries.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    round: u32,
    token_budget_remaining: usize,
    pub tool_results: Vec<AttachedResult>,
    phase: ControllerPhase,
}

impl ConversationState {
    pub fn new(token_budget: usize) -> Self {
        Self {
            messages: Vec::new(),
            round: 0,
            token_budget_remaining: token_budget,
            tool_results: Vec::new(),
            phase: ControllerPhase::Idle,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Start the next round. Rounds strictly increase.
    pub fn next_round(&mut self) -> u32 {
        self.round += 1;
        self.round
    }

    pub fn token_budget_remaining(&self) -> usize {
        self.token_budget_remaining
    }

    /// Charge tokens against the budget. The budget never increases.
    pub fn spend_tokens(&mut self, tokens: usize) {
        self.token_budget_remaining = self.token_budget_remaining.saturating_sub(tokens);
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub fn enter(&mut self, phase: ControllerPhase) {
        if self.phase != phase {
            tracing::debug!(from = %self.phase, to = %phase, round = self.round, "controller phase change");
            self.phase = phase;
        }
    }

    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Attach a tool result as a tool message answering `tool_call_id`.
    pub fn attach_result(&mut self, tool_call_id: &str, result: ToolResult) {
        let message_index = self.push(Message::tool(tool_call_id, result.to_message_content()));
        self.tool_results.push(AttachedResult {
            result,
            message_index,
            round: self.round,
        });
    }

    /// Swap the payload of an attached result and mark it truncated.
    ///
    /// The carrying tool message is rewritten to match.
    pub fn replace_payload(&mut self, position: usize, payload: serde_json::Value) {
        let Some(attached) = self.tool_results.get_mut(position) else {
            return;
        };
        attached.result.outcome = ToolOutcome::Payload(payload);
        attached.result.truncated = true;
        let content = attached.result.to_message_content();
        if let Some(message) = self.messages.get_mut(attached.message_index) {
            message.content = content;
        }
    }

    /// Total characters across all messages.
    pub fn total_chars(&self) -> usize {
        self.messages.iter().map(Message::char_len).sum()
    }

    /// Sources with at least one successful result, in first-attachment order.
    pub fn succeeded_sources(&self) -> Vec<SourceId> {
        let mut sources = Vec::new();
        for attached in &self.tool_results {
            if attached.result.succeeded() && !sources.contains(&attached.result.source) {
                sources.push(attached.result.source);
            }
        }
        sources
    }
}

/// Why the controller stopped looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The LLM produced a terminal answer
    Completed,
    /// Maximum round count reached
    MaxRounds,
    /// Token budget exhausted
    TokenBudget,
    /// Query deadline expired
    Deadline,
}

/// Synthesized answer with source attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub text: String,
    /// Sources whose successful results informed the answer.
    pub citations: Vec<SourceId>,
    /// Synthesis was forced before the LLM finished gathering evidence.
    pub partial: bool,
    pub rounds: u32,
    pub stop_reason: StopReason,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CallStatus, FailureKind, ToolFailure, ToolOutcome};
    use serde_json::json;

    fn result(source: SourceId, ok: bool) -> ToolResult {
        ToolResult {
            source,
            status: if ok { CallStatus::Succeeded } else { CallStatus::Failed },
            outcome: if ok {
                ToolOutcome::Payload(json!({"ok": true}))
            } else {
                ToolOutcome::Error(ToolFailure::new(FailureKind::Timeout, "slow"))
            },
            truncated: false,
            elapsed_ms: 1,
            attempts: 1,
            request_id: None,
        }
    }

    #[test]
    fn test_budget_is_non_increasing() {
        let mut state = ConversationState::new(100);
        state.spend_tokens(40);
        assert_eq!(state.token_budget_remaining(), 60);
        state.spend_tokens(500);
        assert_eq!(state.token_budget_remaining(), 0);
    }

    #[test]
    fn test_rounds_strictly_increase() {
        let mut state = ConversationState::new(100);
        assert_eq!(state.next_round(), 1);
        assert_eq!(state.next_round(), 2);
        assert_eq!(state.round(), 2);
    }

    #[test]
    fn test_succeeded_sources_dedup_in_order() {
        let mut state = ConversationState::new(100);
        state.attach_result("a", result(SourceId::IntAct, true));
        state.attach_result("b", result(SourceId::String, false));
        state.attach_result("c", result(SourceId::UniProt, true));
        state.attach_result("d", result(SourceId::IntAct, true));

        assert_eq!(state.succeeded_sources(), vec![SourceId::IntAct, SourceId::UniProt]);
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.tool_results[1].message_index, 1);
        assert_eq!(state.messages[1].tool_call_id.as_deref(), Some("b"));
    }
}
