//! Process-wide cache of successful source payloads using moka TTL cache.
//!
//! Keys are the source wire name plus the canonical JSON of the arguments.
//! `serde_json` objects keep their keys sorted, so equal arguments always
//! produce equal keys.

use moka::future::Cache;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::{CacheConfig, SourceId};

/// Shared TTL cache for source payloads.
#[derive(Clone)]
pub struct ResultCache {
    entries: Cache<String, Arc<Value>>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { entries }
    }

    /// A cache when enabled in config, `None` otherwise.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(Duration::from_secs(config.ttl_secs), config.max_entries))
    }

    fn key(source: SourceId, arguments: &Value) -> String {
        format!("{}:{}", source.as_str(), arguments)
    }

    pub async fn get(&self, source: SourceId, arguments: &Value) -> Option<Value> {
        self.entries
            .get(&Self::key(source, arguments))
            .await
            .map(|cached| (*cached).clone())
    }

    pub async fn insert(&self, source: SourceId, arguments: &Value, payload: Value) {
        self.entries
            .insert(Self::key(source, arguments), Arc::new(payload))
            .await;
    }
}
