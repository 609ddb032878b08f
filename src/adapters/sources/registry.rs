//! Registry of source connectors keyed by `SourceId`.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::catalog;
use super::http::HttpJsonConnector;
use crate::domain::models::{DatabaseSequence, SourceId, SourcesConfig};
use crate::domain::ports::{SourceConnector, SourceError, ToolSchema};

/// Closed set of connectors the executor and controller may dispatch to.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    connectors: BTreeMap<SourceId, Arc<dyn SourceConnector>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}

/// Per-source query parameters carrying credentials and contact details.
fn credentials(source: SourceId, config: &SourcesConfig) -> Vec<(String, String)> {
    let mut params = Vec::new();
    match source {
        SourceId::Literature => {
            params.push(("tool".to_string(), "biochat".to_string()));
            if let Some(key) = &config.ncbi_api_key {
                params.push(("api_key".to_string(), key.clone()));
            }
            if let Some(email) = &config.email {
                params.push(("email".to_string(), email.clone()));
            }
        }
        SourceId::BioGrid => {
            if let Some(key) = &config.biogrid_access_key {
                params.push(("accesskey".to_string(), key.clone()));
            }
        }
        _ => {}
    }
    params
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in HTTP connector, with credentials and base URL overrides applied.
    pub fn with_builtin(config: &SourcesConfig) -> Result<Self, SourceError> {
        let mut registry = Self::new();
        for source in SourceId::ALL {
            let base_url = config.base_urls.get(source.as_str()).map(String::as_str);
            let connector = HttpJsonConnector::new(
                catalog::definition(source),
                base_url,
                credentials(source, config),
            )?;
            registry.register(Arc::new(connector));
        }
        debug!(sources = registry.len(), "source registry initialized");
        Ok(registry)
    }

    /// Add or replace a connector. Returns the replaced one.
    pub fn register(&mut self, connector: Arc<dyn SourceConnector>) -> Option<Arc<dyn SourceConnector>> {
        self.connectors.insert(connector.id(), connector)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, connector: Arc<dyn SourceConnector>) -> Self {
        self.register(connector);
        self
    }

    pub fn get(&self, source: SourceId) -> Option<&Arc<dyn SourceConnector>> {
        self.connectors.get(&source)
    }

    /// Resolve a tool name as the LLM wrote it.
    pub fn lookup(&self, tool_name: &str) -> Option<&Arc<dyn SourceConnector>> {
        SourceId::from_str(tool_name).and_then(|source| self.get(source))
    }

    pub fn contains(&self, source: SourceId) -> bool {
        self.connectors.contains_key(&source)
    }

    /// Registered sources in catalog order.
    pub fn sources(&self) -> Vec<SourceId> {
        self.connectors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Tool schemas for every registered source.
    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.connectors.values().map(|c| c.tool_schema()).collect()
    }

    /// Tool schemas with the planned sources first, in plan order.
    pub fn tool_schemas_for(&self, plan: &DatabaseSequence) -> Vec<ToolSchema> {
        let planned = plan.iter().filter_map(|source| self.get(source));
        let rest = self
            .connectors
            .iter()
            .filter(|(source, _)| !plan.contains(**source))
            .map(|(_, connector)| connector);
        planned.chain(rest).map(|c| c.tool_schema()).collect()
    }
}
