//! Application facade wiring the pipeline together.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::adapters::cache::ResultCache;
use crate::adapters::memory::InMemoryConversationStore;
use crate::adapters::sources::SourceRegistry;
use crate::domain::errors::FatalError;
use crate::domain::models::{
    Config, DatabaseSequence, Entity, FinalResponse, QueryAnalysis, ToolResult,
};
use crate::domain::ports::{ConversationStore, LlmClient};
use crate::infrastructure::llm::OpenAiClient;
use crate::infrastructure::resilience::SourceRateLimiter;
use crate::services::{
    ConversationController, DefaultSummarizer, QueryAnalyzer, SourceRouter, ToolExecutor,
};

/// Entry point for answering biological questions.
///
/// Each stage is also exposed on its own for inspection from the CLI.
pub struct BioChat {
    analyzer: Arc<QueryAnalyzer>,
    router: SourceRouter,
    executor: Arc<ToolExecutor>,
    controller: ConversationController,
}

impl BioChat {
    /// Build the production pipeline: OpenAI-compatible LLM, HTTP source
    /// connectors, in-memory conversation store.
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm = OpenAiClient::new(config.llm.clone()).context("Failed to create LLM client")?;
        let registry = SourceRegistry::with_builtin(&config.sources)
            .context("Failed to initialize source connectors")?;
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
        Ok(Self::from_parts(Arc::new(llm), registry, store, config))
    }

    /// Build the pipeline around explicit adapters.
    pub fn from_parts(
        llm: Arc<dyn LlmClient>,
        registry: SourceRegistry,
        store: Arc<dyn ConversationStore>,
        config: &Config,
    ) -> Self {
        let analyzer = Arc::new(QueryAnalyzer::new(llm.clone(), config.analysis.clone()));
        let router = SourceRouter::new(config.routing.max_sources);

        let mut executor = ToolExecutor::new(
            Arc::new(registry),
            SourceRateLimiter::new(&config.rate_limits),
            config.executor.clone(),
        )
        .with_batch_deadline(config.controller.query_deadline());
        if let Some(cache) = ResultCache::from_config(&config.cache) {
            executor = executor.with_cache(cache);
        }
        let executor = Arc::new(executor);

        let controller = ConversationController::new(
            analyzer.clone(),
            executor.clone(),
            llm,
            config.controller.clone(),
        )
        .with_router(router)
        .with_summarizer(Arc::new(DefaultSummarizer::new()))
        .with_store(store)
        .with_llm_timeout(config.llm.timeout());

        debug!(
            sources = executor.registry().len(),
            max_concurrency = config.executor.max_concurrency,
            "pipeline ready"
        );

        Self {
            analyzer,
            router,
            executor,
            controller,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        self.executor.registry()
    }

    /// Extract intent, entities and relationship from a question.
    pub async fn analyze(&self, text: &str) -> QueryAnalysis {
        self.analyzer
            .analyze(text, self.analyzer.default_timeout())
            .await
    }

    /// Rank sources for an analysis.
    pub fn route(&self, analysis: &QueryAnalysis) -> DatabaseSequence {
        self.router.route(analysis)
    }

    /// Run every planned source once, without the LLM loop.
    pub async fn execute(&self, plan: &DatabaseSequence, entities: &[Entity]) -> Vec<ToolResult> {
        self.executor.execute(plan, entities).await
    }

    /// Answer a question end to end.
    #[instrument(skip(self, query))]
    pub async fn process(
        &self,
        query: &str,
        conversation_id: Option<&str>,
    ) -> Result<FinalResponse, FatalError> {
        self.controller.process(query, conversation_id).await
    }
}
