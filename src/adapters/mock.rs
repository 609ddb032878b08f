//! Test doubles for the LLM and source connector ports.
//!
//! Both doubles are scripted: outcomes are consumed in order, then a
//! fallback applies. They record what they were asked so tests can assert
//! on call counts, arguments and concurrency.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::models::{Entity, SourceId};
use crate::domain::ports::{
    ArgumentSchema, Completion, CompletionRequest, FieldKind, LlmClient, LlmError,
    SourceConnector, SourceError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Handler = Arc<dyn Fn(&CompletionRequest) -> Result<Completion, LlmError> + Send + Sync>;

/// LLM double that replays a script of completions.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    handler: Option<Handler>,
    delay: Duration,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<Result<Completion, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            handler: None,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request past the end of the script with `handler`.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<Completion, LlmError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = lock(&self.script).pop_front();
        let outcome = match (next, &self.handler) {
            (Some(scripted), _) => scripted,
            (None, Some(handler)) => handler(&request),
            (None, None) => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        };
        lock(&self.requests).push(request);
        outcome
    }
}

/// Concurrent invocation counter shared by several connectors.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Highest concurrency observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.current)
    }
}

/// Decrements the in-flight counter when an invocation ends or is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Source connector double.
pub struct MockConnector {
    id: SourceId,
    schema: ArgumentSchema,
    script: Mutex<VecDeque<Result<Value, SourceError>>>,
    fallback: Result<Value, SourceError>,
    delay: Duration,
    prerequisite: Option<SourceId>,
    calls: AtomicU32,
    gauge: Arc<ConcurrencyGauge>,
    received: Mutex<Vec<Value>>,
}

impl MockConnector {
    /// A connector that always succeeds with `{"source": <id>, "ok": true}`.
    pub fn new(id: SourceId) -> Self {
        Self {
            id,
            schema: ArgumentSchema::new().optional("terms", FieldKind::StringList, "Search terms"),
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(json!({"source": id.as_str(), "ok": true})),
            delay: Duration::ZERO,
            prerequisite: None,
            calls: AtomicU32::new(0),
            gauge: ConcurrencyGauge::new(),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(id: SourceId, payload: Value) -> Self {
        Self {
            fallback: Ok(payload),
            ..Self::new(id)
        }
    }

    pub fn failing(id: SourceId, error: SourceError) -> Self {
        Self {
            fallback: Err(error),
            ..Self::new(id)
        }
    }

    /// Outcomes returned before the fallback applies.
    pub fn with_script(self, script: Vec<Result<Value, SourceError>>) -> Self {
        *lock(&self.script) = script.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_schema(mut self, schema: ArgumentSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_prerequisite(mut self, source: SourceId) -> Self {
        self.prerequisite = Some(source);
        self
    }

    /// Count invocations in a gauge shared with other connectors.
    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = gauge;
        self
    }

    /// Invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous invocations observed.
    pub fn max_in_flight(&self) -> usize {
        self.gauge.peak()
    }

    /// Arguments of every invocation, in order.
    pub fn received_arguments(&self) -> Vec<Value> {
        lock(&self.received).clone()
    }
}

#[async_trait]
impl SourceConnector for MockConnector {
    fn id(&self) -> SourceId {
        self.id
    }

    fn description(&self) -> &str {
        "Mock source"
    }

    fn argument_schema(&self) -> &ArgumentSchema {
        &self.schema
    }

    fn build_arguments(&self, entities: &[Entity]) -> Value {
        let terms: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        json!({ "terms": terms })
    }

    fn prerequisite(&self) -> Option<SourceId> {
        self.prerequisite
    }

    fn derive_arguments(&self, mut arguments: Value, upstream: &Value) -> Value {
        if let Value::Object(map) = &mut arguments {
            map.insert("upstream".to_string(), upstream.clone());
        }
        arguments
    }

    async fn invoke(&self, arguments: &Value, timeout: Duration) -> Result<Value, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.received).push(arguments.clone());

        let _in_flight = self.gauge.enter();

        if !self.delay.is_zero()
            && tokio::time::timeout(timeout, tokio::time::sleep(self.delay))
                .await
                .is_err()
        {
            return Err(SourceError::Timeout);
        }

        let scripted = lock(&self.script).pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Message;

    #[tokio::test]
    async fn test_scripted_llm_replays_then_uses_handler() {
        let llm = ScriptedLlm::new(vec![Ok(Completion::text("first"))])
            .with_handler(|_| Ok(Completion::text("again")));
        let request = CompletionRequest::new(vec![Message::user("hi")], Duration::from_secs(1));

        let first = llm.complete(request.clone()).await.unwrap();
        let second = llm.complete(request).await.unwrap();
        assert_eq!(first.text.as_deref(), Some("first"));
        assert_eq!(second.text.as_deref(), Some("again"));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_connector_script_then_fallback() {
        let connector = MockConnector::new(SourceId::String)
            .with_script(vec![Err(SourceError::Timeout)]);

        let args = json!({"terms": ["BRCA1"]});
        assert!(connector.invoke(&args, Duration::from_secs(1)).await.is_err());
        assert!(connector.invoke(&args, Duration::from_secs(1)).await.is_ok());
        assert_eq!(connector.calls(), 2);
        assert_eq!(connector.received_arguments().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_connector_times_out() {
        let connector = MockConnector::new(SourceId::UniProt).with_delay(Duration::from_millis(200));
        let err = connector
            .invoke(&json!({}), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout));
    }
}
