//! Conversation persistence port.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::Message;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation store unavailable: {0}")]
    Unavailable(String),
}

/// Message history keyed by conversation id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Messages of a conversation in order; empty for unknown ids.
    async fn load(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError>;

    async fn append(&self, conversation_id: &str, message: Message) -> Result<(), StoreError>;
}
