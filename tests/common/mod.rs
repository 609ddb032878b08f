//! Common test utilities for integration tests
//!
//! Pipeline fixtures built from the mock adapters.

#![allow(dead_code)]

use serde_json::Value;
use std::sync::Arc;

use biochat::adapters::memory::InMemoryConversationStore;
use biochat::adapters::mock::{MockConnector, ScriptedLlm};
use biochat::adapters::sources::SourceRegistry;
use biochat::domain::models::{Config, RateLimitConfig, ToolRequest};
use biochat::BioChat;

/// Defaults with rate limits out of the way and a short per-call timeout.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.rate_limits.default = RateLimitConfig {
        requests_per_second: 10_000.0,
        burst_size: 10_000,
    };
    config.rate_limits.overrides.clear();
    config.executor.call_timeout_ms = 1_000;
    config
}

/// A pipeline over mock connectors.
pub fn pipeline(llm: Arc<ScriptedLlm>, connectors: &[Arc<MockConnector>], config: &Config) -> BioChat {
    let mut registry = SourceRegistry::new();
    for connector in connectors {
        registry.register(connector.clone());
    }
    BioChat::from_parts(
        llm,
        registry,
        Arc::new(InMemoryConversationStore::new()),
        config,
    )
}

pub fn tool_request(id: &str, name: &str, arguments: Value) -> ToolRequest {
    ToolRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
