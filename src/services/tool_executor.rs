//! Tool executor: runs planned source calls with bounded concurrency.
//!
//! Calls form a small dependency graph (an arena of `ToolCall`s with
//! index-based `depends_on` links). The graph is evaluated in waves: every
//! call in a wave only depends on calls from earlier waves. Within a wave,
//! calls run concurrently behind a semaphore of size K. Each call is
//! rate-limited per source, retried on transient failures, and bounded by a
//! per-call timeout and the batch deadline. A failing call never aborts the
//! batch; exactly one `ToolResult` comes back per call, in request order.

use futures::future::join_all;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::adapters::cache::ResultCache;
use crate::adapters::sources::SourceRegistry;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CallStatus, ControllerConfig, DatabaseSequence, Entity, ExecutorConfig, FailureKind, ToolCall,
    ToolFailure, ToolOutcome, ToolResult,
};
use crate::domain::ports::SourceError;
use crate::infrastructure::resilience::{RetryPolicy, SourceRateLimiter};

/// Arena of tool calls. A call may only depend on an earlier call.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    calls: Vec<ToolCall>,
}

impl CallGraph {
    /// Build a graph, rejecting forward and self dependencies.
    pub fn new(calls: Vec<ToolCall>) -> DomainResult<Self> {
        let mut graph = Self::default();
        for call in calls {
            graph.push(call)?;
        }
        Ok(graph)
    }

    /// Append a call and return its index.
    pub fn push(&mut self, call: ToolCall) -> DomainResult<usize> {
        let index = self.calls.len();
        if let Some(dependency) = call.depends_on {
            if dependency >= index {
                return Err(DomainError::InvalidDependency {
                    dependent: index,
                    dependency,
                });
            }
        }
        self.calls.push(call);
        Ok(index)
    }

    /// Link calls to the earliest earlier call of their connector's prerequisite.
    ///
    /// Calls that already carry a dependency keep it.
    pub fn link_prerequisites(&mut self, registry: &SourceRegistry) {
        for index in 0..self.calls.len() {
            if self.calls[index].depends_on.is_some() {
                continue;
            }
            let Some(prerequisite) = registry
                .get(self.calls[index].source)
                .and_then(|connector| connector.prerequisite())
            else {
                continue;
            };
            self.calls[index].depends_on = self.calls[..index]
                .iter()
                .position(|call| call.source == prerequisite);
        }
    }

    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Call indices grouped by dependency depth, in request order within a wave.
    pub fn waves(&self) -> Vec<Vec<usize>> {
        let mut depth = vec![0usize; self.calls.len()];
        let mut waves: Vec<Vec<usize>> = Vec::new();
        for (index, call) in self.calls.iter().enumerate() {
            depth[index] = call.depends_on.map_or(0, |dependency| depth[dependency] + 1);
            if waves.len() <= depth[index] {
                waves.resize_with(depth[index] + 1, Vec::new);
            }
            waves[depth[index]].push(index);
        }
        waves
    }
}

fn settle(call: &mut ToolCall, status: CallStatus) {
    if let Err(err) = call.transition_to(status) {
        warn!(source = %call.source, error = %err, "ignoring invalid call transition");
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn failed(call: &ToolCall, status: CallStatus, failure: ToolFailure, elapsed_ms: u64, attempts: u32) -> ToolResult {
    ToolResult {
        source: call.source,
        status,
        outcome: ToolOutcome::Error(failure),
        truncated: false,
        elapsed_ms,
        attempts,
        request_id: call.request_id.clone(),
    }
}

/// Runs batches of source calls.
pub struct ToolExecutor {
    registry: Arc<SourceRegistry>,
    rate_limiter: SourceRateLimiter,
    cache: Option<ResultCache>,
    retry: RetryPolicy,
    config: ExecutorConfig,
    batch_deadline: Duration,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<SourceRegistry>,
        rate_limiter: SourceRateLimiter,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            rate_limiter,
            cache: None,
            retry: RetryPolicy::from_config(&config.retry),
            config,
            batch_deadline: ControllerConfig::default().query_deadline(),
        }
    }

    /// Share a result cache across batches.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Deadline applied by [`execute`](Self::execute).
    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = deadline;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// One call per planned source, with arguments built from the entities.
    pub fn plan_calls(&self, plan: &DatabaseSequence, entities: &[Entity]) -> Vec<ToolCall> {
        plan.iter()
            .map(|source| {
                let arguments = self
                    .registry
                    .get(source)
                    .map_or_else(|| Value::Object(Default::default()), |c| c.build_arguments(entities));
                ToolCall::new(source, arguments)
            })
            .collect()
    }

    /// Execute a routed plan. Returns one result per planned source, in plan order.
    pub async fn execute(&self, plan: &DatabaseSequence, entities: &[Entity]) -> Vec<ToolResult> {
        let mut graph = CallGraph::default();
        for call in self.plan_calls(plan, entities) {
            // Fresh calls carry no dependencies, so push cannot fail.
            let _ = graph.push(call);
        }
        graph.link_prerequisites(&self.registry);
        self.run(graph, Instant::now() + self.batch_deadline).await
    }

    /// Execute explicit calls against a deadline.
    ///
    /// Explicit `depends_on` links are validated; prerequisites are linked for
    /// the remaining calls.
    pub async fn execute_calls(
        &self,
        calls: Vec<ToolCall>,
        deadline: Instant,
    ) -> DomainResult<Vec<ToolResult>> {
        let mut graph = CallGraph::new(calls)?;
        graph.link_prerequisites(&self.registry);
        Ok(self.run(graph, deadline).await)
    }

    #[instrument(skip_all, fields(calls = graph.len()))]
    async fn run(&self, graph: CallGraph, deadline: Instant) -> Vec<ToolResult> {
        let waves = graph.waves();
        let mut calls = graph.calls;
        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        let semaphore = Semaphore::new(self.config.max_concurrency.max(1));

        for wave in waves {
            let mut runnable = Vec::with_capacity(wave.len());
            for index in wave {
                let Some(dependency) = calls[index].depends_on else {
                    runnable.push(index);
                    continue;
                };
                let upstream = slots[dependency]
                    .as_ref()
                    .filter(|result| result.succeeded())
                    .and_then(ToolResult::payload);
                match upstream {
                    Some(upstream) => {
                        if let Some(connector) = self.registry.get(calls[index].source) {
                            let arguments = std::mem::take(&mut calls[index].arguments);
                            calls[index].arguments = connector.derive_arguments(arguments, upstream);
                        }
                        runnable.push(index);
                    }
                    _ => {
                        let prerequisite = calls[dependency].source;
                        debug!(source = %calls[index].source, prerequisite = %prerequisite, "skipping call");
                        settle(&mut calls[index], CallStatus::Skipped);
                        slots[index] = Some(failed(
                            &calls[index],
                            CallStatus::Skipped,
                            ToolFailure::new(
                                FailureKind::DependencyFailed,
                                format!("prerequisite {prerequisite} did not succeed"),
                            ),
                            0,
                            0,
                        ));
                    }
                }
            }

            let batch: Vec<(usize, ToolCall)> = runnable
                .into_iter()
                .map(|index| (index, calls[index].clone()))
                .collect();
            let semaphore = &semaphore;
            let pending = batch.into_iter().map(|(index, call)| async move {
                (index, self.run_call(call, semaphore, deadline).await)
            });
            for (index, (call, result)) in join_all(pending).await {
                calls[index] = call;
                slots[index] = Some(result);
            }
        }

        let results: Vec<ToolResult> = slots
            .into_iter()
            .zip(&calls)
            .map(|(slot, call)| {
                slot.unwrap_or_else(|| {
                    failed(
                        call,
                        CallStatus::Failed,
                        ToolFailure::new(FailureKind::UpstreamError, "call was never scheduled"),
                        0,
                        0,
                    )
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        info!(
            total = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "tool batch finished"
        );
        results
    }

    /// Run one call to a terminal status.
    async fn run_call(
        &self,
        mut call: ToolCall,
        semaphore: &Semaphore,
        deadline: Instant,
    ) -> (ToolCall, ToolResult) {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let outcome =
            tokio::time::timeout_at(deadline, self.attempt(&mut call, semaphore, &attempts)).await;
        let attempts = attempts.load(Ordering::SeqCst);
        let elapsed = elapsed_ms(started);

        let result = match outcome {
            Ok(Ok(payload)) => {
                settle(&mut call, CallStatus::Succeeded);
                debug!(source = %call.source, attempts, elapsed_ms = elapsed, "call succeeded");
                ToolResult {
                    source: call.source,
                    status: CallStatus::Succeeded,
                    outcome: ToolOutcome::Payload(payload),
                    truncated: false,
                    elapsed_ms: elapsed,
                    attempts,
                    request_id: call.request_id.clone(),
                }
            }
            Ok(Err(err)) => {
                settle(&mut call, CallStatus::Failed);
                warn!(source = %call.source, attempts, error = %err, "call failed");
                failed(
                    &call,
                    CallStatus::Failed,
                    ToolFailure::new(err.failure_kind(), err.to_string()),
                    elapsed,
                    attempts,
                )
            }
            Err(_) => {
                settle(&mut call, CallStatus::Failed);
                warn!(source = %call.source, attempts, "call cancelled at query deadline");
                failed(
                    &call,
                    CallStatus::Failed,
                    ToolFailure::new(FailureKind::Timeout, "query deadline exceeded"),
                    elapsed,
                    attempts,
                )
            }
        };
        (call, result)
    }

    async fn attempt(
        &self,
        call: &mut ToolCall,
        semaphore: &Semaphore,
        attempts: &AtomicU32,
    ) -> Result<Value, SourceError> {
        let source = call.source;
        let connector = self
            .registry
            .get(source)
            .cloned()
            .ok_or_else(|| SourceError::InvalidArgument(format!("source {source} is not registered")))?;
        connector.argument_schema().validate(&call.arguments)?;

        if let Some(cache) = &self.cache {
            if let Some(payload) = cache.get(source, &call.arguments).await {
                debug!(source = %source, "served from cache");
                settle(call, CallStatus::Running);
                return Ok(payload);
            }
        }

        let _permit = semaphore
            .acquire()
            .await
            .map_err(|_| SourceError::Network("executor shut down".to_string()))?;
        settle(call, CallStatus::Running);

        let arguments = &call.arguments;
        let call_timeout = self.config.call_timeout();
        let payload = self
            .retry
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                let connector = &connector;
                async move {
                    self.rate_limiter.acquire(source).await;
                    tokio::time::timeout(call_timeout, connector.invoke(arguments, call_timeout))
                        .await
                        .unwrap_or(Err(SourceError::Timeout))
                }
            })
            .await?;

        if let Some(cache) = &self.cache {
            cache.insert(source, arguments, payload.clone()).await;
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{ConcurrencyGauge, MockConnector};
    use crate::domain::models::{EntityType, RateLimitConfig, RateLimitsConfig, RetryConfig, SourceId};
    use crate::domain::ports::{ArgumentSchema, FieldKind};
    use serde_json::json;

    fn unlimited() -> SourceRateLimiter {
        SourceRateLimiter::new(&RateLimitsConfig {
            default: RateLimitConfig {
                requests_per_second: 10_000.0,
                burst_size: 10_000,
            },
            overrides: Default::default(),
        })
    }

    fn executor(connectors: Vec<Arc<MockConnector>>, max_concurrency: usize) -> ToolExecutor {
        let mut registry = SourceRegistry::new();
        for connector in connectors {
            registry.register(connector);
        }
        let config = ExecutorConfig {
            max_concurrency,
            call_timeout_ms: 1_000,
            retry: RetryConfig::default(),
        };
        ToolExecutor::new(Arc::new(registry), unlimited(), config)
    }

    fn brca1() -> Vec<Entity> {
        vec![Entity::new(EntityType::Protein, "BRCA1")]
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_result_per_call_despite_failure() {
        let string = Arc::new(MockConnector::failing(SourceId::String, SourceError::Timeout));
        let uniprot = Arc::new(MockConnector::new(SourceId::UniProt));
        let intact = Arc::new(MockConnector::new(SourceId::IntAct));
        let executor = executor(vec![string.clone(), uniprot.clone(), intact.clone()], 4);

        let plan = DatabaseSequence::from_ranked(
            [SourceId::UniProt, SourceId::String, SourceId::IntAct],
            5,
        );
        let results = executor.execute(&plan, &brca1()).await;

        assert_eq!(results.len(), 3);
        let sources: Vec<SourceId> = results.iter().map(|r| r.source).collect();
        assert_eq!(sources, plan.sources());

        assert!(results[0].succeeded());
        assert_eq!(results[1].status, CallStatus::Failed);
        assert_eq!(results[1].failure().unwrap().kind, FailureKind::Timeout);
        assert_eq!(results[1].attempts, 3);
        assert!(results[2].succeeded());
        assert_eq!(string.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let chembl = Arc::new(MockConnector::failing(
            SourceId::Chembl,
            SourceError::from_status(404, "not found"),
        ));
        let executor = executor(vec![chembl.clone()], 4);
        let plan = DatabaseSequence::from_ranked([SourceId::Chembl], 5);

        let results = executor.execute(&plan, &brca1()).await;
        assert_eq!(results[0].attempts, 1);
        assert_eq!(results[0].failure().unwrap().kind, FailureKind::UpstreamError);
        assert_eq!(chembl.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_semaphore() {
        let gauge = ConcurrencyGauge::new();
        let sources = [
            SourceId::Literature,
            SourceId::UniProt,
            SourceId::String,
            SourceId::IntAct,
            SourceId::BioGrid,
        ];
        let connectors: Vec<Arc<MockConnector>> = sources
            .iter()
            .map(|&s| {
                Arc::new(
                    MockConnector::new(s)
                        .with_delay(Duration::from_millis(100))
                        .with_gauge(gauge.clone()),
                )
            })
            .collect();
        let executor = executor(connectors, 2);

        let plan = DatabaseSequence::from_ranked(sources, 5);
        let results = executor.execute(&plan, &brca1()).await;

        assert!(results.iter().all(ToolResult::succeeded));
        assert!(gauge.peak() <= 2, "peak {}", gauge.peak());
        assert_eq!(gauge.peak(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependent_skipped_when_prerequisite_fails() {
        let uniprot = Arc::new(MockConnector::failing(
            SourceId::UniProt,
            SourceError::from_status(400, "bad query"),
        ));
        let target = Arc::new(
            MockConnector::new(SourceId::TargetAnalysis).with_prerequisite(SourceId::UniProt),
        );
        let executor = executor(vec![uniprot, target.clone()], 4);

        let plan = DatabaseSequence::from_ranked([SourceId::UniProt, SourceId::TargetAnalysis], 5);
        let results = executor.execute(&plan, &brca1()).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[1].status, CallStatus::Skipped);
        assert_eq!(results[1].attempts, 0);
        assert_eq!(results[1].failure().unwrap().kind, FailureKind::DependencyFailed);
        assert_eq!(target.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependent_receives_upstream_payload() {
        let uniprot = Arc::new(MockConnector::succeeding(
            SourceId::UniProt,
            json!({"gene": "ENSG00000012048"}),
        ));
        let target = Arc::new(
            MockConnector::new(SourceId::TargetAnalysis).with_prerequisite(SourceId::UniProt),
        );
        let executor = executor(vec![uniprot, target.clone()], 4);

        let plan = DatabaseSequence::from_ranked([SourceId::UniProt, SourceId::TargetAnalysis], 5);
        let results = executor.execute(&plan, &brca1()).await;

        assert!(results.iter().all(ToolResult::succeeded));
        let received = target.received_arguments();
        assert_eq!(received[0]["upstream"]["gene"], "ENSG00000012048");
    }

    #[tokio::test(start_paused = true)]
    async fn test_prerequisite_later_in_batch_is_not_linked() {
        let uniprot = Arc::new(MockConnector::new(SourceId::UniProt));
        let target = Arc::new(
            MockConnector::new(SourceId::TargetAnalysis).with_prerequisite(SourceId::UniProt),
        );
        let executor = executor(vec![uniprot, target.clone()], 4);

        let plan = DatabaseSequence::from_ranked([SourceId::TargetAnalysis, SourceId::UniProt], 5);
        let results = executor.execute(&plan, &brca1()).await;
        assert!(results.iter().all(ToolResult::succeeded));
        assert!(target.received_arguments()[0].get("upstream").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_arguments_fail_only_that_call() {
        let strict = Arc::new(MockConnector::new(SourceId::Gwas).with_schema(
            ArgumentSchema::new().required("trait", FieldKind::String, "Trait"),
        ));
        let other = Arc::new(MockConnector::new(SourceId::Literature));
        let executor = executor(vec![strict.clone(), other], 4);

        let plan = DatabaseSequence::from_ranked([SourceId::Gwas, SourceId::Literature], 5);
        let results = executor.execute(&plan, &brca1()).await;

        assert_eq!(results[0].status, CallStatus::Failed);
        assert_eq!(results[0].failure().unwrap().kind, FailureKind::InvalidArgument);
        assert_eq!(results[0].attempts, 0);
        assert_eq!(strict.calls(), 0);
        assert!(results[1].succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_source_fails() {
        let executor = executor(vec![Arc::new(MockConnector::new(SourceId::Literature))], 4);
        let plan = DatabaseSequence::from_ranked([SourceId::Pathways, SourceId::Literature], 5);
        let results = executor.execute(&plan, &brca1()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, CallStatus::Failed);
        assert!(results[1].succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_pending_and_running_calls() {
        let slow = Arc::new(MockConnector::new(SourceId::String).with_delay(Duration::from_secs(30)));
        let fast = Arc::new(MockConnector::new(SourceId::UniProt));
        let executor = executor(vec![slow, fast], 4);

        let calls = vec![
            ToolCall::new(SourceId::UniProt, json!({})),
            ToolCall::new(SourceId::String, json!({})),
        ];
        let results = executor
            .execute_calls(calls, Instant::now() + Duration::from_millis(500))
            .await
            .unwrap();

        assert!(results[0].succeeded());
        assert_eq!(results[1].status, CallStatus::Failed);
        assert_eq!(results[1].failure().unwrap().kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_forward_dependency_rejected() {
        let executor = executor(vec![], 4);
        let mut first = ToolCall::new(SourceId::UniProt, json!({}));
        first.depends_on = Some(1);
        let calls = vec![first, ToolCall::new(SourceId::String, json!({}))];

        let err = executor
            .execute_calls(calls, Instant::now() + Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidDependency { dependent: 0, dependency: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_invocation() {
        let uniprot = Arc::new(MockConnector::new(SourceId::UniProt));
        let executor = executor(vec![uniprot.clone()], 4)
            .with_cache(ResultCache::new(Duration::from_secs(60), 10));
        let plan = DatabaseSequence::from_ranked([SourceId::UniProt], 5);

        let first = executor.execute(&plan, &brca1()).await;
        let second = executor.execute(&plan, &brca1()).await;

        assert_eq!(first[0].attempts, 1);
        assert!(second[0].succeeded());
        assert_eq!(second[0].attempts, 0);
        assert_eq!(uniprot.calls(), 1);
    }

    #[test]
    fn test_waves_follow_dependencies() {
        let mut second = ToolCall::new(SourceId::TargetAnalysis, json!({}));
        second.depends_on = Some(0);
        let mut third = ToolCall::new(SourceId::Chembl, json!({}));
        third.depends_on = Some(1);
        let graph = CallGraph::new(vec![
            ToolCall::new(SourceId::UniProt, json!({})),
            second,
            third,
            ToolCall::new(SourceId::Literature, json!({})),
        ])
        .unwrap();
        assert_eq!(graph.waves(), vec![vec![0, 3], vec![1], vec![2]]);
    }
}
