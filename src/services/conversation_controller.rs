//! Conversation controller: the multi-round tool loop for one query.
//!
//! Analyze, route, then alternate between asking the LLM what to do next
//! and executing the tools it requested, until the model answers on its own
//! or a limit (rounds, token budget, deadline) forces a partial synthesis.
//! Source failures never abort a query; only an LLM completion failure does.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::context_truncation::{estimate_tokens, ContextBudget, CHARS_PER_TOKEN};
use super::prompt_builder::{system_prompt, FORCED_SYNTHESIS};
use super::query_analyzer::QueryAnalyzer;
use super::response_summarizer::DefaultSummarizer;
use super::source_router::SourceRouter;
use super::tool_executor::ToolExecutor;
use crate::domain::errors::FatalError;
use crate::domain::models::{
    ControllerConfig, ControllerPhase, ConversationState, Entity, FinalResponse, LlmConfig,
    Message, Role, StopReason, ToolCall, ToolOutcome, ToolRequest, ToolResult,
};
use crate::domain::ports::{
    Completion, CompletionRequest, ConversationStore, LlmClient, LlmError, ResponseSummarizer,
    ToolSchema,
};

/// Outcome of the tool loop before synthesis.
enum LoopExit {
    Answered(String),
    Forced(StopReason),
}

/// Merge LLM-supplied arguments over entity-derived defaults.
///
/// Null and empty-string values from the model do not clobber defaults.
fn merge_arguments(defaults: Value, requested: &Value) -> Value {
    let (Value::Object(mut merged), Value::Object(overrides)) = (defaults.clone(), requested) else {
        return match requested {
            Value::Object(_) => requested.clone(),
            _ => defaults,
        };
    };
    for (key, value) in overrides {
        let blank = value.is_null() || value.as_str().is_some_and(str::is_empty);
        if !blank {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

fn tool_error(request: &ToolRequest, message: &str) -> Message {
    Message::tool(
        request.id.clone(),
        json!({"tool": request.name, "error": message}).to_string(),
    )
}

/// Drives one query from text to a cited answer.
pub struct ConversationController {
    analyzer: Arc<QueryAnalyzer>,
    router: SourceRouter,
    executor: Arc<ToolExecutor>,
    llm: Arc<dyn LlmClient>,
    summarizer: Arc<dyn ResponseSummarizer>,
    store: Option<Arc<dyn ConversationStore>>,
    config: ControllerConfig,
    llm_timeout: Duration,
}

impl ConversationController {
    pub fn new(
        analyzer: Arc<QueryAnalyzer>,
        executor: Arc<ToolExecutor>,
        llm: Arc<dyn LlmClient>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            analyzer,
            router: SourceRouter::default(),
            executor,
            llm,
            summarizer: Arc::new(DefaultSummarizer::new()),
            store: None,
            config,
            llm_timeout: LlmConfig::default().timeout(),
        }
    }

    pub fn with_router(mut self, router: SourceRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn ResponseSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Persist turns under a conversation id.
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Timeout for a single completion.
    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    fn context_budget(&self) -> ContextBudget {
        ContextBudget::new(
            self.config.context_window_tokens,
            self.config.response_reserve_tokens,
        )
    }

    /// Answer a query, optionally continuing a stored conversation.
    #[instrument(skip(self, query), fields(chars = query.len()))]
    pub async fn process(
        &self,
        query: &str,
        conversation_id: Option<&str>,
    ) -> Result<FinalResponse, FatalError> {
        let deadline = Instant::now() + self.config.query_deadline();
        let mut state = ConversationState::new(self.config.token_budget);

        state.enter(ControllerPhase::Analyzing);
        let analysis_timeout = self
            .analyzer
            .default_timeout()
            .min(deadline.saturating_duration_since(Instant::now()));
        let analysis = self.analyzer.analyze(query, analysis_timeout).await;

        state.enter(ControllerPhase::Routing);
        let plan = self.router.route(&analysis);
        let tools = self.executor.registry().tool_schemas_for(&plan);
        info!(
            intent = %analysis.intent,
            entities = analysis.entities.len(),
            plan = ?plan.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            "query routed"
        );

        state.push(Message::system(system_prompt(&analysis, &plan)));
        for message in self.history(conversation_id).await {
            state.push(message);
        }
        state.push(Message::user(query));
        self.remember(conversation_id, Message::user(query)).await;

        let exit = self
            .tool_loop(&mut state, &analysis.entities, tools, deadline)
            .await;
        let exit = match exit {
            Ok(exit) => exit,
            Err(err) => {
                state.enter(ControllerPhase::Failed);
                return Err(err);
            }
        };

        let (text, stop_reason) = match exit {
            LoopExit::Answered(text) => (text, StopReason::Completed),
            LoopExit::Forced(reason) => match self.force_synthesis(&mut state, reason).await {
                Ok(text) => (text, reason),
                Err(err) => {
                    state.enter(ControllerPhase::Failed);
                    return Err(err);
                }
            },
        };

        state.enter(ControllerPhase::Done);
        self.remember(conversation_id, Message::assistant(text.clone()))
            .await;

        let response = FinalResponse {
            text,
            citations: state.succeeded_sources(),
            partial: stop_reason != StopReason::Completed,
            rounds: state.round(),
            stop_reason,
        };
        info!(
            rounds = response.rounds,
            citations = response.citations.len(),
            partial = response.partial,
            "query answered"
        );
        Ok(response)
    }

    async fn tool_loop(
        &self,
        state: &mut ConversationState,
        entities: &[Entity],
        tools: Vec<ToolSchema>,
        deadline: Instant,
    ) -> Result<LoopExit, FatalError> {
        let budget = self.context_budget();
        loop {
            if state.round() >= self.config.max_rounds {
                return Ok(LoopExit::Forced(StopReason::MaxRounds));
            }
            if state.token_budget_remaining() == 0 {
                return Ok(LoopExit::Forced(StopReason::TokenBudget));
            }
            if Instant::now() >= deadline {
                return Ok(LoopExit::Forced(StopReason::Deadline));
            }

            let round = state.next_round();
            state.enter(ControllerPhase::Synthesizing);
            let timeout = self
                .llm_timeout
                .min(deadline.saturating_duration_since(Instant::now()));
            let request =
                CompletionRequest::new(state.messages.clone(), timeout).with_tools(tools.clone());

            let completion = match tokio::time::timeout_at(deadline, self.complete(state, request)).await {
                Ok(Ok(completion)) => completion,
                Ok(Err(LlmError::Timeout(_))) | Err(_) if Instant::now() >= deadline => {
                    return Ok(LoopExit::Forced(StopReason::Deadline));
                }
                Ok(Err(err)) => return Err(FatalError::completion("synthesizing", err)),
                Err(_) => return Ok(LoopExit::Forced(StopReason::Deadline)),
            };

            if completion.is_terminal() {
                return Ok(LoopExit::Answered(completion.text.unwrap_or_default()));
            }

            debug!(round, requests = completion.tool_requests.len(), "model requested tools");
            state.push(Message::assistant_with_tools(
                completion.text.unwrap_or_default(),
                completion.tool_requests.clone(),
            ));

            state.enter(ControllerPhase::Executing);
            self.run_tools(state, entities, &completion.tool_requests, deadline, &budget)
                .await;
        }
    }

    /// Run one completion and charge its tokens against the budget.
    async fn complete(
        &self,
        state: &mut ConversationState,
        request: CompletionRequest,
    ) -> Result<Completion, LlmError> {
        let prompt_chars: usize = request.messages.iter().map(Message::char_len).sum();
        let completion = self.llm.complete(request).await?;
        let spent = completion.usage.map_or_else(
            || {
                prompt_chars.div_ceil(CHARS_PER_TOKEN)
                    + completion.text.as_deref().map_or(0, estimate_tokens)
            },
            |usage| usage.total() as usize,
        );
        state.spend_tokens(spent);
        debug!(
            spent,
            remaining = state.token_budget_remaining(),
            "completion tokens charged"
        );
        Ok(completion)
    }

    /// Execute the requested tools and attach one tool message per request, in request order.
    async fn run_tools(
        &self,
        state: &mut ConversationState,
        entities: &[Entity],
        requests: &[ToolRequest],
        deadline: Instant,
        budget: &ContextBudget,
    ) {
        let registry = self.executor.registry();
        let mut calls = Vec::with_capacity(requests.len());
        for request in requests {
            match registry.lookup(&request.name) {
                Some(connector) => {
                    let arguments =
                        merge_arguments(connector.build_arguments(entities), &request.arguments);
                    calls.push(ToolCall::new(connector.id(), arguments).with_request_id(&request.id));
                }
                None => warn!(tool = %request.name, "model requested an unknown tool"),
            }
        }

        let results = match self.executor.execute_calls(calls, deadline).await {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, "tool batch rejected");
                Vec::new()
            }
        };

        let incoming: usize = results
            .iter()
            .map(|r| r.to_message_content().len())
            .sum();
        if !budget.fits(state.total_chars(), incoming) {
            self.make_room(state, incoming, budget).await;
        }

        let mut by_request: HashMap<String, ToolResult> = results
            .into_iter()
            .filter_map(|result| result.request_id.clone().map(|id| (id, result)))
            .collect();

        for request in requests {
            if registry.lookup(&request.name).is_none() {
                state.push(tool_error(request, "unknown tool"));
                continue;
            }
            match by_request.remove(&request.id) {
                Some(result) => {
                    let result = self.fit_result(state, result, budget).await;
                    state.attach_result(&request.id, result);
                }
                None => {
                    state.push(tool_error(request, "tool did not run"));
                }
            }
        }
    }

    /// Condense a fresh result that is too large for the context window.
    async fn fit_result(
        &self,
        state: &ConversationState,
        mut result: ToolResult,
        budget: &ContextBudget,
    ) -> ToolResult {
        let Some(payload) = result.payload() else {
            return result;
        };
        let size = result.to_message_content().len();
        let remaining = budget.usable_chars().saturating_sub(state.total_chars());
        let target = budget
            .max_result_chars()
            .min(remaining)
            .max(budget.min_keep_chars);
        if size <= target {
            return result;
        }

        let condensed = self.summarizer.summarize(result.source, payload, target).await;
        debug!(source = %result.source, from = size, target, "condensed tool result");
        result.outcome = ToolOutcome::Payload(condensed);
        result.truncated = true;
        result
    }

    /// Shrink already-attached payloads, largest first, until `incoming` fits.
    async fn make_room(&self, state: &mut ConversationState, incoming: usize, budget: &ContextBudget) {
        let mut candidates: Vec<(usize, usize)> = state
            .tool_results
            .iter()
            .enumerate()
            .filter(|(_, attached)| attached.result.payload().is_some())
            .map(|(position, attached)| (position, attached.result.to_message_content().len()))
            .filter(|(_, size)| *size > budget.min_keep_chars)
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        for (position, size) in candidates {
            if budget.fits(state.total_chars(), incoming) {
                break;
            }
            let attached = &state.tool_results[position];
            let Some(payload) = attached.result.payload() else {
                continue;
            };
            let target = (size / 4).max(budget.min_keep_chars);
            let condensed = self
                .summarizer
                .summarize(attached.result.source, payload, target)
                .await;
            debug!(source = %attached.result.source, from = size, target, "condensed earlier tool result");
            state.replace_payload(position, condensed);
        }
    }

    /// Final completion without tools, after the loop was cut short.
    async fn force_synthesis(
        &self,
        state: &mut ConversationState,
        reason: StopReason,
    ) -> Result<String, FatalError> {
        info!(reason = ?reason, round = state.round(), "forcing synthesis");
        state.enter(ControllerPhase::Synthesizing);
        state.push(Message::user(FORCED_SYNTHESIS));
        let request = CompletionRequest::new(state.messages.clone(), self.llm_timeout);
        let completion = self
            .complete(state, request)
            .await
            .map_err(|err| FatalError::completion("forced synthesis", err))?;
        Ok(completion.text.unwrap_or_default())
    }

    /// Prior user and assistant turns of a stored conversation.
    async fn history(&self, conversation_id: Option<&str>) -> Vec<Message> {
        let (Some(store), Some(id)) = (&self.store, conversation_id) else {
            return Vec::new();
        };
        match store.load(id).await {
            Ok(messages) => messages
                .into_iter()
                .filter(|m| matches!(m.role, Role::User | Role::Assistant) && m.tool_requests.is_empty())
                .collect(),
            Err(err) => {
                warn!(conversation = id, error = %err, "could not load conversation history");
                Vec::new()
            }
        }
    }

    async fn remember(&self, conversation_id: Option<&str>, message: Message) {
        let (Some(store), Some(id)) = (&self.store, conversation_id) else {
            return;
        };
        if let Err(err) = store.append(id, message).await {
            warn!(conversation = id, error = %err, "could not store conversation turn");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryConversationStore;
    use crate::adapters::mock::{MockConnector, ScriptedLlm};
    use crate::adapters::sources::SourceRegistry;
    use crate::domain::models::{
        AnalysisConfig, ExecutorConfig, RateLimitConfig, RateLimitsConfig, RetryConfig, SourceId,
    };
    use crate::domain::ports::{SourceError, StoreError, TokenUsage};
    use crate::infrastructure::resilience::SourceRateLimiter;
    use async_trait::async_trait;

    fn call(id: &str, name: &str, arguments: Value) -> ToolRequest {
        ToolRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn controller(
        connectors: Vec<Arc<MockConnector>>,
        llm: Arc<ScriptedLlm>,
        config: ControllerConfig,
    ) -> ConversationController {
        controller_with_call_timeout(connectors, llm, config, 1_000)
    }

    fn controller_with_call_timeout(
        connectors: Vec<Arc<MockConnector>>,
        llm: Arc<ScriptedLlm>,
        config: ControllerConfig,
        call_timeout_ms: u64,
    ) -> ConversationController {
        let mut registry = SourceRegistry::new();
        for connector in connectors {
            registry.register(connector);
        }
        let limiter = SourceRateLimiter::new(&RateLimitsConfig {
            default: RateLimitConfig {
                requests_per_second: 10_000.0,
                burst_size: 10_000,
            },
            overrides: Default::default(),
        });
        let executor = ToolExecutor::new(
            Arc::new(registry),
            limiter,
            ExecutorConfig {
                max_concurrency: 4,
                call_timeout_ms,
                retry: RetryConfig::default(),
            },
        );
        // An empty script makes extraction fail, so analysis uses the gazetteer.
        let analyzer = QueryAnalyzer::new(Arc::new(ScriptedLlm::new(vec![])), AnalysisConfig::default());
        ConversationController::new(Arc::new(analyzer), Arc::new(executor), llm, config)
    }

    #[test]
    fn test_merge_arguments() {
        let merged = merge_arguments(
            json!({"protein_id": "BRCA1", "limit": 5}),
            &json!({"protein_id": "P38398", "limit": null, "extra": ""}),
        );
        assert_eq!(merged, json!({"protein_id": "P38398", "limit": 5}));
        assert_eq!(merge_arguments(json!({"a": 1}), &json!("garbage")), json!({"a": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(Completion::text("BRCA1 repairs DNA."))]));
        let controller = controller(vec![], llm.clone(), ControllerConfig::default());

        let response = controller.process("What does BRCA1 do?", None).await.unwrap();
        assert_eq!(response.text, "BRCA1 repairs DNA.");
        assert_eq!(response.stop_reason, StopReason::Completed);
        assert!(!response.partial);
        assert!(response.citations.is_empty());
        assert_eq!(response.rounds, 1);

        let requests = llm.requests();
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].messages[0].content.contains("BRCA1 (protein)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_round_then_answer_cites_sources() {
        let uniprot = Arc::new(MockConnector::new(SourceId::UniProt));
        let string = Arc::new(MockConnector::failing(SourceId::String, SourceError::Timeout));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Completion::tools(vec![
                call("c1", "uniprot", json!({"terms": ["BRCA1"]})),
                call("c2", "string", json!({})),
            ])),
            Ok(Completion::text("answer")),
        ]));
        let controller = controller(vec![uniprot.clone(), string.clone()], llm.clone(), ControllerConfig::default());

        let response = controller.process("BRCA1 interactions", None).await.unwrap();
        assert_eq!(response.citations, vec![SourceId::UniProt]);
        assert_eq!(response.rounds, 2);
        assert!(!response.partial);
        assert_eq!(uniprot.calls(), 1);
        assert_eq!(string.calls(), 3);

        let second = &llm.requests()[1];
        let tool_messages: Vec<&Message> = second
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 2);
        assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("c1"));
        assert!(tool_messages[1].content.contains("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_limit_forces_partial_synthesis() {
        let llm = Arc::new(ScriptedLlm::new(vec![]).with_handler(|request| {
            if request.tools.is_empty() {
                Ok(Completion::text("best effort"))
            } else {
                Ok(Completion::tools(vec![call("c", "uniprot", json!({}))]))
            }
        }));
        let uniprot = Arc::new(MockConnector::new(SourceId::UniProt));
        let controller = controller(vec![uniprot.clone()], llm.clone(), ControllerConfig::default());

        let response = controller.process("BRCA1", None).await.unwrap();
        assert!(response.partial);
        assert_eq!(response.stop_reason, StopReason::MaxRounds);
        assert_eq!(response.rounds, 5);
        assert_eq!(response.text, "best effort");
        assert_eq!(uniprot.calls(), 5);
        assert_eq!(llm.calls(), 6);
        let last = llm.requests().pop().unwrap();
        assert!(last.tools.is_empty());
        assert_eq!(last.messages.last().unwrap().content, FORCED_SYNTHESIS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_budget_forces_synthesis() {
        let llm = Arc::new(ScriptedLlm::new(vec![]).with_handler(|request| {
            let mut completion = if request.tools.is_empty() {
                Completion::text("short on budget")
            } else {
                Completion::tools(vec![call("c", "uniprot", json!({}))])
            };
            completion.usage = Some(TokenUsage {
                prompt_tokens: 600,
                completion_tokens: 100,
            });
            Ok(completion)
        }));
        let config = ControllerConfig {
            token_budget: 1_000,
            ..ControllerConfig::default()
        };
        let controller = controller(vec![Arc::new(MockConnector::new(SourceId::UniProt))], llm, config);

        let response = controller.process("BRCA1", None).await.unwrap();
        assert_eq!(response.stop_reason, StopReason::TokenBudget);
        assert_eq!(response.rounds, 2);
        assert!(response.partial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_llm_failure_is_fatal() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::Authentication(
            "bad key".to_string(),
        ))]));
        let controller = controller(vec![], llm, ControllerConfig::default());

        let err = controller.process("BRCA1", None).await.unwrap_err();
        assert!(matches!(err, FatalError::Completion { phase: "synthesizing", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tool_gets_error_message() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Completion::tools(vec![call("c1", "disgenet", json!({}))])),
            Ok(Completion::text("done")),
        ]));
        let controller = controller(vec![], llm.clone(), ControllerConfig::default());

        let response = controller.process("BRCA1", None).await.unwrap();
        assert!(response.citations.is_empty());
        let tool_message = llm.requests()[1]
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .cloned()
            .unwrap();
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("c1"));
        assert!(tool_message.content.contains("unknown tool"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_messages_follow_request_order() {
        let uniprot = Arc::new(MockConnector::new(SourceId::UniProt));
        let string = Arc::new(MockConnector::new(SourceId::String));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Completion::tools(vec![
                call("a", "uniprot", json!({})),
                call("bogus", "disgenet", json!({})),
                call("c", "string", json!({})),
            ])),
            Ok(Completion::text("done")),
        ]));
        let controller = controller(vec![uniprot, string], llm.clone(), ControllerConfig::default());

        let response = controller.process("BRCA1 interactions", None).await.unwrap();
        assert_eq!(response.citations, vec![SourceId::UniProt, SourceId::String]);

        let order: Vec<Option<String>> = llm.requests()[1]
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(
            order,
            vec![Some("a".to_string()), Some("bogus".to_string()), Some("c".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_deadline_cancels_slow_call() {
        let string = Arc::new(
            MockConnector::new(SourceId::String).with_delay(Duration::from_secs(600)),
        );
        let uniprot = Arc::new(MockConnector::new(SourceId::UniProt));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Completion::tools(vec![
                call("s", "string", json!({})),
                call("u", "uniprot", json!({})),
            ])),
            Ok(Completion::text("what arrived in time")),
        ]));
        let config = ControllerConfig {
            query_deadline_secs: 3,
            ..ControllerConfig::default()
        };
        let controller = controller_with_call_timeout(
            vec![string.clone(), uniprot],
            llm.clone(),
            config,
            900_000,
        );

        let started = Instant::now();
        let response = controller.process("BRCA1 interactions", None).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(600));
        assert_eq!(response.stop_reason, StopReason::Deadline);
        assert!(response.partial);
        assert_eq!(response.rounds, 1);
        assert_eq!(response.citations, vec![SourceId::UniProt]);
        assert_eq!(response.text, "what arrived in time");
        assert_eq!(string.calls(), 1);

        let last = llm.requests().pop().unwrap();
        assert!(last.tools.is_empty());
        let cancelled = last
            .messages
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("s"))
            .cloned()
            .unwrap();
        assert!(cancelled.content.contains("deadline"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_result_is_condensed() {
        let rows: Vec<Value> = (0..2_000)
            .map(|i| json!({"id": i, "note": "x".repeat(40)}))
            .collect();
        let big = Arc::new(MockConnector::succeeding(SourceId::UniProt, json!({"results": rows})));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Completion::tools(vec![call("c1", "uniprot", json!({}))])),
            Ok(Completion::text("done")),
        ]));
        let config = ControllerConfig {
            context_window_tokens: 10_000,
            response_reserve_tokens: 2_000,
            ..ControllerConfig::default()
        };
        let limit = ContextBudget::new(10_000, 2_000).max_result_chars();
        let controller = controller(vec![big], llm.clone(), config);

        let response = controller.process("BRCA1", None).await.unwrap();
        assert_eq!(response.citations, vec![SourceId::UniProt]);
        let tool_message = llm.requests()[1]
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .cloned()
            .unwrap();
        assert!(tool_message.content.len() <= limit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turns_are_stored() {
        let store = Arc::new(InMemoryConversationStore::new());
        store
            .append("conv", Message::user("earlier question"))
            .await
            .unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(Completion::text("answer"))]));
        let controller = controller(vec![], llm.clone(), ControllerConfig::default())
            .with_store(store.clone());

        controller.process("BRCA1", Some("conv")).await.unwrap();

        let stored = store.load("conv").await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[2], Message::assistant("answer"));
        assert!(llm.requests()[0]
            .messages
            .iter()
            .any(|m| m.content == "earlier question"));
    }

    struct BrokenStore;

    #[async_trait]
    impl ConversationStore for BrokenStore {
        async fn load(&self, _: &str) -> Result<Vec<Message>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn append(&self, _: &str, _: Message) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failures_do_not_fail_query() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(Completion::text("answer"))]));
        let controller = controller(vec![], llm, ControllerConfig::default())
            .with_store(Arc::new(BrokenStore));
        let response = controller.process("BRCA1", Some("conv")).await.unwrap();
        assert_eq!(response.text, "answer");
    }
}
