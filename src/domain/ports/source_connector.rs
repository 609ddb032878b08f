//! Source connector port.
//!
//! One capability interface over every biological database. The router and
//! executor only ever see `dyn SourceConnector`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

use super::llm_client::ToolSchema;
use crate::domain::models::{Entity, FailureKind, SourceId};

/// Errors a connector invocation may raise.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Arguments do not satisfy the source's schema
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Request timed out")]
    Timeout,

    /// HTTP 429 or equivalent
    #[error("Rate limited by upstream")]
    RateLimited,

    /// Upstream returned an error status
    #[error("Upstream error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Upstream {
        status: Option<u16>,
        message: String,
        transient: bool,
    },

    /// Connection reset, DNS failure and similar
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream payload did not have the expected shape
    #[error("Schema violation: {0}")]
    SchemaViolation(String),
}

impl SourceError {
    /// Build an upstream error from an HTTP status: 5xx is transient, other codes are not.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if status == 429 {
            return Self::RateLimited;
        }
        Self::Upstream {
            status: Some(status),
            message: message.into(),
            transient: status >= 500,
        }
    }

    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::RateLimited | Self::Network(_) => true,
            Self::Upstream { transient, .. } => *transient,
            Self::InvalidArgument(_) | Self::SchemaViolation(_) => false,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::InvalidArgument(_) => FailureKind::InvalidArgument,
            Self::Timeout => FailureKind::Timeout,
            Self::RateLimited => FailureKind::RateLimited,
            Self::Upstream { .. } | Self::Network(_) | Self::SchemaViolation(_) => {
                FailureKind::UpstreamError
            }
        }
    }
}

/// Type of an argument field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    StringList,
    Integer,
    Number,
    Boolean,
    /// One of a fixed set of strings.
    Choice(&'static [&'static str]),
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Choice(options) => value.as_str().is_some_and(|v| options.contains(&v)),
        }
    }

    fn json_schema(self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::StringList => json!({"type": "array", "items": {"type": "string"}}),
            Self::Integer => json!({"type": "integer"}),
            Self::Number => json!({"type": "number"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Choice(options) => json!({"type": "string", "enum": options}),
        }
    }

    fn label(self) -> String {
        match self {
            Self::String => "a string".to_string(),
            Self::StringList => "a list of strings".to_string(),
            Self::Integer => "an integer".to_string(),
            Self::Number => "a number".to_string(),
            Self::Boolean => "a boolean".to_string(),
            Self::Choice(options) => format!("one of [{}]", options.join(", ")),
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
}

/// Declared argument schema of a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSchema {
    pub fields: Vec<ArgumentField>,
    /// At least one of these fields must be present and non-empty.
    pub at_least_one_of: Vec<&'static str>,
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

impl ArgumentSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        self.fields.push(ArgumentField {
            name,
            kind,
            description,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        self.fields.push(ArgumentField {
            name,
            kind,
            description,
            required: false,
        });
        self
    }

    pub fn at_least_one_of(mut self, names: &[&'static str]) -> Self {
        self.at_least_one_of = names.to_vec();
        self
    }

    pub fn field(&self, name: &str) -> Option<&ArgumentField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check arguments against the schema. Undeclared keys are ignored.
    pub fn validate(&self, arguments: &Value) -> Result<(), SourceError> {
        let Some(object) = arguments.as_object() else {
            return Err(SourceError::InvalidArgument(
                "arguments must be a JSON object".to_string(),
            ));
        };

        for field in &self.fields {
            match object.get(field.name) {
                Some(value) if !is_blank(value) => {
                    if !field.kind.matches(value) {
                        return Err(SourceError::InvalidArgument(format!(
                            "'{}' must be {}",
                            field.name,
                            field.kind.label()
                        )));
                    }
                }
                _ if field.required => {
                    return Err(SourceError::InvalidArgument(format!(
                        "missing required argument '{}'",
                        field.name
                    )));
                }
                _ => {}
            }
        }

        if !self.at_least_one_of.is_empty()
            && !self
                .at_least_one_of
                .iter()
                .any(|name| object.get(*name).is_some_and(|v| !is_blank(v)))
        {
            return Err(SourceError::InvalidArgument(format!(
                "at least one of [{}] must be provided",
                self.at_least_one_of.join(", ")
            )));
        }

        Ok(())
    }

    /// JSON-Schema object used as the tool's `parameters`.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = field.kind.json_schema();
            if let Value::Object(map) = &mut property {
                map.insert("description".to_string(), json!(field.description));
            }
            properties.insert(field.name.to_string(), property);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });
        if !self.at_least_one_of.is_empty() {
            schema["description"] = json!(format!(
                "Provide at least one of: {}",
                self.at_least_one_of.join(", ")
            ));
        }
        schema
    }
}

/// Uniform capability over a biological database.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn id(&self) -> SourceId;

    /// One-line description shown to the LLM.
    fn description(&self) -> &str;

    fn argument_schema(&self) -> &ArgumentSchema;

    /// Default arguments derived from the query's entities.
    fn build_arguments(&self, entities: &[Entity]) -> Value;

    /// Source whose successful payload refines this source's arguments.
    fn prerequisite(&self) -> Option<SourceId> {
        None
    }

    /// Refine arguments using the prerequisite's payload.
    fn derive_arguments(&self, arguments: Value, _upstream: &Value) -> Value {
        arguments
    }

    /// Invoke the source with validated arguments.
    async fn invoke(&self, arguments: &Value, timeout: Duration) -> Result<Value, SourceError>;

    fn tool_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.id().as_str().to_string(),
            description: self.description().to_string(),
            parameters: self.argument_schema().to_json_schema(),
        }
    }
}
