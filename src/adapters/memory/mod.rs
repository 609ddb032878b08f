//! In-process adapters.

pub mod conversation_store;

pub use conversation_store::InMemoryConversationStore;
