//! In-memory conversation store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::models::Message;
use crate::domain::ports::{ConversationStore, StoreError};

/// Conversation history held in process memory. Lost on exit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn append(&self, conversation_id: &str, message: Message) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_then_load_in_order() {
        let store = InMemoryConversationStore::new();
        store.append("c1", Message::user("first")).await.unwrap();
        store.append("c1", Message::assistant("second")).await.unwrap();
        store.append("c2", Message::user("other")).await.unwrap();

        let messages = store.load("c1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_empty() {
        let store = InMemoryConversationStore::new();
        assert!(store.load("missing").await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }
}
