//! BioChat - multi-source biological question answering
//!
//! A question goes through four stages: the query analyzer extracts intent,
//! entities and relationships; the source router ranks the biological
//! databases worth consulting; the tool executor calls them concurrently with
//! rate limits, retries and timeouts; and the conversation controller lets an
//! LLM pick tools over several rounds before synthesizing a cited answer.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, invariants and port traits
//! - **Service Layer** (`services`): Analysis, routing, execution and the conversation loop
//! - **Adapter Layer** (`adapters`): Source connectors, caches, stores and test doubles
//! - **Infrastructure Layer** (`infrastructure`): Config, logging, resilience and the LLM backend
//! - **Application Layer** (`application`): Wiring
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use biochat::application::BioChat;
//! use biochat::infrastructure::config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let biochat = BioChat::from_config(&ConfigLoader::load()?)?;
//!     let response = biochat.process("What proteins interact with BRCA1?", None).await?;
//!     println!("{}", response.text);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::BioChat;
pub use domain::errors::{DomainError, FatalError};
pub use domain::models::{
    CallStatus, Config, DatabaseSequence, Entity, EntityType, FinalResponse, QueryAnalysis,
    QueryIntent, RelationshipType, SourceId, ToolCall, ToolResult,
};
pub use domain::ports::{ConversationStore, LlmClient, ResponseSummarizer, SourceConnector};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ConversationController, QueryAnalyzer, SourceRouter, ToolExecutor};
