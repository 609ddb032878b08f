//! Entity/intent extraction.
//!
//! Asks the LLM for a structured reading of the query and falls back to a
//! keyword analysis whenever the answer is late, malformed, or untrusted.
//! `analyze` never fails.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::gazetteer;
use crate::domain::models::{
    AnalysisConfig, Entity, EntityType, Message, QueryAnalysis, QueryIntent, RelationshipType,
};
use crate::domain::ports::{CompletionRequest, LlmClient, LlmError};

const ANALYSIS_PROMPT: &str = r#"You are a specialized biological query analyzer that extracts structured information from research questions.

Analyze the given biological research query and extract:
1. primary_intent: The main purpose of the query (explanation, prediction, comparison, identification, mechanism, treatment, diagnosis)
2. entities: All biological entities mentioned in the query, categorized by type
3. relationship_type: The type of relationship being asked about

Return a JSON object with the following structure:
{
    "primary_intent": "explanation|prediction|comparison|identification|mechanism|treatment|diagnosis",
    "entities": {
        "gene": ["BRCA1", "TP53"],
        "protein": ["insulin"],
        "pathway": ["apoptosis"],
        "disease": ["diabetes"],
        "drug": ["metformin"],
        "variant": ["rs123456"],
        "cell_type": ["T cell"],
        "tissue": ["liver"],
        "phenotype": ["obesity"],
        "organism": ["mouse"],
        "chemical": ["glucose"]
    },
    "relationship_type": "causal|associative|regulatory|structural|functional|unknown",
    "confidence": 0.8
}

Only include entity types that are actually present in the query. If no entities of a particular type are mentioned, omit that type entirely."#;

/// Why an LLM analysis was rejected. Always recovered by the fallback.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("extraction call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("malformed extraction output: {0}")]
    Malformed(String),

    #[error("confidence {confidence} below threshold {threshold}")]
    LowConfidence { confidence: f32, threshold: f32 },

    #[error("no entities extracted")]
    NoEntities,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(alias = "intent")]
    primary_intent: Option<String>,
    #[serde(default)]
    entities: Value,
    #[serde(alias = "relationship")]
    relationship_type: Option<String>,
    confidence: Option<f32>,
}

/// Strip markdown fences and take the outermost JSON object.
fn extract_json_object(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_prefix("```").unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    let text = text.trim();

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }
    text
}

/// Accept both `{"gene": ["TP53"]}` and `[{"type": "gene", "name": "TP53"}]`.
fn parse_entities(value: &Value) -> Vec<Entity> {
    let mut entities = Vec::new();
    match value {
        Value::Object(by_type) => {
            for (type_name, names) in by_type {
                let Some(entity_type) = EntityType::from_str(type_name) else {
                    debug!(entity_type = %type_name, "ignoring unknown entity type");
                    continue;
                };
                let names: Vec<&str> = match names {
                    Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                    Value::String(single) => vec![single.as_str()],
                    _ => Vec::new(),
                };
                entities.extend(names.into_iter().map(|n| Entity::new(entity_type, n.trim())));
            }
        }
        Value::Array(items) => {
            for item in items {
                let entity_type = item
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(EntityType::from_str);
                let name = item.get("name").and_then(Value::as_str);
                if let (Some(entity_type), Some(name)) = (entity_type, name) {
                    entities.push(Entity::new(entity_type, name.trim()));
                }
            }
        }
        _ => {}
    }
    entities.retain(|e| !e.name.is_empty());
    entities
}

/// Order entities by first mention in the query; unmentioned ones keep their relative order at the end.
fn order_by_mention(query: &str, mut entities: Vec<Entity>) -> Vec<Entity> {
    let lower = query.to_lowercase();
    entities.sort_by_key(|e| lower.find(&e.name.to_lowercase()).unwrap_or(usize::MAX));
    let mut unique: Vec<Entity> = Vec::with_capacity(entities.len());
    for entity in entities {
        if !unique.contains(&entity) {
            unique.push(entity);
        }
    }
    unique
}

/// Turns query text into a `QueryAnalysis`.
pub struct QueryAnalyzer {
    llm: Arc<dyn LlmClient>,
    config: AnalysisConfig,
}

impl QueryAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>, config: AnalysisConfig) -> Self {
        Self { llm, config }
    }

    /// Timeout used when the caller does not supply one.
    pub fn default_timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Analyze a query. Falls back to keyword matching on any extraction problem.
    #[instrument(skip(self, text), fields(chars = text.len()))]
    pub async fn analyze(&self, text: &str, timeout: Duration) -> QueryAnalysis {
        match self.extract(text, timeout).await {
            Ok(analysis) => {
                debug!(
                    intent = %analysis.intent,
                    entities = analysis.entities.len(),
                    confidence = analysis.confidence,
                    "query analyzed"
                );
                analysis
            }
            Err(reason) => {
                let analysis = Self::fallback(text);
                warn!(
                    reason = %reason,
                    entities = analysis.entities.len(),
                    "using heuristic query analysis"
                );
                analysis
            }
        }
    }

    /// Keyword-only analysis.
    pub fn fallback(text: &str) -> QueryAnalysis {
        QueryAnalysis::fallback(gazetteer::match_entities(text))
    }

    async fn extract(&self, text: &str, timeout: Duration) -> Result<QueryAnalysis, AnalysisError> {
        let request = CompletionRequest::new(
            vec![Message::system(ANALYSIS_PROMPT), Message::user(text)],
            timeout,
        )
        .json();

        let completion = tokio::time::timeout(timeout, self.llm.complete(request))
            .await
            .map_err(|_| AnalysisError::Timeout(timeout))??;

        let body = completion
            .text
            .ok_or_else(|| AnalysisError::Malformed("empty response".to_string()))?;
        self.interpret(text, &body)
    }

    fn interpret(&self, query: &str, body: &str) -> Result<QueryAnalysis, AnalysisError> {
        let raw: RawAnalysis = serde_json::from_str(extract_json_object(body))
            .map_err(|e| AnalysisError::Malformed(e.to_string()))?;

        let intent_name = raw.primary_intent.unwrap_or_default();
        let intent = QueryIntent::from_str(&intent_name)
            .ok_or_else(|| AnalysisError::Malformed(format!("unknown intent '{intent_name}'")))?;

        let confidence = raw.confidence.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(AnalysisError::Malformed(format!(
                "confidence {confidence} out of range"
            )));
        }
        if confidence < self.config.confidence_threshold {
            return Err(AnalysisError::LowConfidence {
                confidence,
                threshold: self.config.confidence_threshold,
            });
        }

        let entities = order_by_mention(query, parse_entities(&raw.entities));
        if entities.is_empty() {
            return Err(AnalysisError::NoEntities);
        }

        Ok(QueryAnalysis {
            intent,
            entities,
            relationship: raw
                .relationship_type
                .as_deref()
                .and_then(RelationshipType::from_str),
            confidence,
        })
    }
}
