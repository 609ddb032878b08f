//! Response summarizer port.

use async_trait::async_trait;

use crate::domain::models::SourceId;

/// Condenses source payloads so they fit a character target.
#[async_trait]
pub trait ResponseSummarizer: Send + Sync {
    /// Return a payload whose serialized form fits in `target_chars`.
    async fn summarize(
        &self,
        source: SourceId,
        payload: &serde_json::Value,
        target_chars: usize,
    ) -> serde_json::Value;
}
