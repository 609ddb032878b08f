//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async interfaces that adapters implement:
//! - LlmClient: chat completions with function-style tools
//! - SourceConnector: one biological database behind a uniform interface
//! - ResponseSummarizer: condenses oversized source payloads
//! - ConversationStore: message history per conversation

pub mod conversation_store;
pub mod llm_client;
pub mod source_connector;
pub mod summarizer;

pub use conversation_store::{ConversationStore, StoreError};
pub use llm_client::{
    Completion, CompletionRequest, LlmClient, LlmError, ResponseFormat, TokenUsage, ToolSchema,
};
pub use source_connector::{ArgumentField, ArgumentSchema, FieldKind, SourceConnector, SourceError};
pub use summarizer::ResponseSummarizer;
