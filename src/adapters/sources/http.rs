//! Generic JSON-over-HTTP source connector.
//!
//! Each database is a `SourceDefinition`: its argument schema, how default
//! arguments come from entities, and how validated arguments become an HTTP
//! request. Some sources need a second request that depends on the first
//! response (an id lookup, then the details). `HttpJsonConnector` runs the
//! requests and classifies failures.

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::models::{Entity, SourceId};
use crate::domain::ports::{ArgumentSchema, SourceConnector, SourceError};

/// Upper bound on upstream error bodies carried in errors.
const MAX_ERROR_BODY: usize = 300;

/// An HTTP request derived from validated arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParts {
    /// Path segments appended to the base URL, each percent-encoded.
    pub path: Vec<String>,
    pub query: Vec<(String, String)>,
    /// JSON body; its presence makes the request a POST.
    pub body: Option<Value>,
}

impl RequestParts {
    pub fn get<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn post(body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

pub type BuildArguments = fn(&[Entity]) -> Value;
pub type BuildRequest = fn(&Value) -> Result<RequestParts, SourceError>;
pub type RefineArguments = fn(Value, &Value) -> Value;
pub type NextRequest = fn(&Value, &Value) -> Result<Option<RequestParts>, SourceError>;
pub type CombinePayloads = fn(&Value, Value, Value) -> Value;

/// Second request issued from the first response.
#[derive(Clone, Copy)]
pub struct FollowUp {
    /// Arguments and first payload to the second request, or `None` when the
    /// first payload is already the answer.
    pub request: NextRequest,
    /// Arguments and both payloads to the final payload.
    pub combine: CombinePayloads,
}

/// The second payload as-is.
pub fn second_payload(_arguments: &Value, _first: Value, second: Value) -> Value {
    second
}

/// Static description of one database endpoint.
pub struct SourceDefinition {
    pub id: SourceId,
    pub description: &'static str,
    pub base_url: &'static str,
    pub schema: ArgumentSchema,
    pub build_arguments: BuildArguments,
    pub request: BuildRequest,
    /// Source whose payload refines the arguments, and how.
    pub prerequisite: Option<(SourceId, RefineArguments)>,
    pub follow_up: Option<FollowUp>,
    /// GraphQL endpoint: `errors` fail the call, `data` is the payload.
    pub graphql: bool,
}

impl std::fmt::Debug for SourceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDefinition")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("graphql", &self.graphql)
            .field("follow_up", &self.follow_up.is_some())
            .finish_non_exhaustive()
    }
}

/// Connector for any `SourceDefinition`.
#[derive(Debug)]
pub struct HttpJsonConnector {
    definition: SourceDefinition,
    base_url: Url,
    client: Client,
    /// Credentials and contact parameters added to every request.
    extra_query: Vec<(String, String)>,
}

fn classify(err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout
    } else if err.is_decode() {
        SourceError::SchemaViolation(err.to_string())
    } else {
        SourceError::Network(err.to_string())
    }
}

fn clip(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

impl HttpJsonConnector {
    /// Build a connector, optionally overriding the definition's base URL.
    pub fn new(
        definition: SourceDefinition,
        base_url: Option<&str>,
        extra_query: Vec<(String, String)>,
    ) -> Result<Self, SourceError> {
        let raw = base_url.unwrap_or(definition.base_url);
        let base_url = Url::parse(raw).map_err(|e| {
            SourceError::InvalidArgument(format!("invalid base URL '{raw}' for {}: {e}", definition.id))
        })?;
        let client = Client::builder()
            .user_agent(concat!("biochat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            definition,
            base_url,
            client,
            extra_query,
        })
    }

    fn url_for(&self, parts: &RequestParts) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        if !parts.path.is_empty() {
            let mut segments = url.path_segments_mut().map_err(|()| {
                SourceError::InvalidArgument(format!("base URL {} cannot take a path", self.base_url))
            })?;
            segments.pop_if_empty().extend(&parts.path);
        }
        Ok(url)
    }

    fn unwrap_graphql(&self, mut payload: Value) -> Result<Value, SourceError> {
        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(SourceError::Upstream {
                    status: None,
                    message,
                    transient: false,
                });
            }
        }
        match payload.get_mut("data").map(Value::take) {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(SourceError::SchemaViolation(
                "GraphQL response without data".to_string(),
            )),
        }
    }

    async fn send(&self, parts: &RequestParts, timeout: Duration) -> Result<Value, SourceError> {
        let url = self.url_for(parts)?;
        let request = match &parts.body {
            Some(body) => self.client.post(url).json(body),
            None => self.client.get(url),
        };
        let response = request
            .header(header::ACCEPT, "application/json")
            .query(&parts.query)
            .query(&self.extra_query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::from_status(status.as_u16(), clip(body)));
        }

        let payload: Value = response.json().await.map_err(|e| classify(&e))?;
        debug!(status = status.as_u16(), "source responded");

        if self.definition.graphql {
            return self.unwrap_graphql(payload);
        }
        Ok(payload)
    }
}

#[async_trait]
impl SourceConnector for HttpJsonConnector {
    fn id(&self) -> SourceId {
        self.definition.id
    }

    fn description(&self) -> &str {
        self.definition.description
    }

    fn argument_schema(&self) -> &ArgumentSchema {
        &self.definition.schema
    }

    fn build_arguments(&self, entities: &[Entity]) -> Value {
        (self.definition.build_arguments)(entities)
    }

    fn prerequisite(&self) -> Option<SourceId> {
        self.definition.prerequisite.map(|(source, _)| source)
    }

    fn derive_arguments(&self, arguments: Value, upstream: &Value) -> Value {
        match self.definition.prerequisite {
            Some((_, refine)) => refine(arguments, upstream),
            None => arguments,
        }
    }

    #[instrument(skip(self, arguments), fields(source = %self.definition.id))]
    async fn invoke(&self, arguments: &Value, timeout: Duration) -> Result<Value, SourceError> {
        let parts = (self.definition.request)(arguments)?;
        let first = self.send(&parts, timeout).await?;

        let Some(follow_up) = self.definition.follow_up else {
            return Ok(first);
        };
        let Some(next) = (follow_up.request)(arguments, &first)? else {
            return Ok(first);
        };
        debug!("issuing follow-up request");
        let second = self.send(&next, timeout).await?;
        Ok((follow_up.combine)(arguments, first, second))
    }
}
