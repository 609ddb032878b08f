//! Query analysis domain model.
//!
//! A `QueryAnalysis` is the structured reading of a free-text research
//! question: what the user wants (intent), which biological entities are
//! involved, and how those entities are related.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Purpose of a biological query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// Explain how or why something works
    Explanation,
    /// Predict outcomes or behaviors
    Prediction,
    /// Compare entities or processes
    Comparison,
    /// Identify or characterize entities
    Identification,
    /// Describe biological mechanisms
    Mechanism,
    /// Treatments or interventions
    Treatment,
    /// Disease diagnosis
    Diagnosis,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explanation => "explanation",
            Self::Prediction => "prediction",
            Self::Comparison => "comparison",
            Self::Identification => "identification",
            Self::Mechanism => "mechanism",
            Self::Treatment => "treatment",
            Self::Diagnosis => "diagnosis",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "explanation" => Some(Self::Explanation),
            "prediction" => Some(Self::Prediction),
            "comparison" => Some(Self::Comparison),
            "identification" => Some(Self::Identification),
            "mechanism" => Some(Self::Mechanism),
            "treatment" => Some(Self::Treatment),
            "diagnosis" => Some(Self::Diagnosis),
            _ => None,
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of biological entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Gene,
    Protein,
    Pathway,
    Disease,
    Drug,
    Variant,
    CellType,
    Tissue,
    Phenotype,
    Organism,
    Chemical,
}

impl EntityType {
    /// All entity types in canonical order.
    pub const ALL: [Self; 11] = [
        Self::Gene,
        Self::Protein,
        Self::Pathway,
        Self::Disease,
        Self::Drug,
        Self::Variant,
        Self::CellType,
        Self::Tissue,
        Self::Phenotype,
        Self::Organism,
        Self::Chemical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gene => "gene",
            Self::Protein => "protein",
            Self::Pathway => "pathway",
            Self::Disease => "disease",
            Self::Drug => "drug",
            Self::Variant => "variant",
            Self::CellType => "cell_type",
            Self::Tissue => "tissue",
            Self::Phenotype => "phenotype",
            Self::Organism => "organism",
            Self::Chemical => "chemical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "gene" | "genes" => Some(Self::Gene),
            "protein" | "proteins" => Some(Self::Protein),
            "pathway" | "pathways" => Some(Self::Pathway),
            "disease" | "diseases" => Some(Self::Disease),
            "drug" | "drugs" => Some(Self::Drug),
            "variant" | "variants" => Some(Self::Variant),
            "cell_type" | "celltype" | "cell_types" => Some(Self::CellType),
            "tissue" | "tissues" => Some(Self::Tissue),
            "phenotype" | "phenotypes" => Some(Self::Phenotype),
            "organism" | "organisms" => Some(Self::Organism),
            "chemical" | "chemicals" => Some(Self::Chemical),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of relationship between entities that a query asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Direct cause-effect
    Causal,
    /// Statistical association
    Associative,
    /// Activation or inhibition
    Regulatory,
    /// Physical or structural contact
    Structural,
    /// Shared or dependent function
    Functional,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Causal => "causal",
            Self::Associative => "associative",
            Self::Regulatory => "regulatory",
            Self::Structural => "structural",
            Self::Functional => "functional",
        }
    }

    /// Parse a relationship name. "unknown", "none" and empty strings map to `None`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "causal" => Some(Self::Causal),
            "associative" => Some(Self::Associative),
            "regulatory" => Some(Self::Regulatory),
            "structural" => Some(Self::Structural),
            "functional" => Some(Self::Functional),
            _ => None,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed biological concept mentioned in a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
}

impl Entity {
    pub fn new(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            name: name.into(),
        }
    }
}

/// Structured reading of a research question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: QueryIntent,
    /// Entities in order of mention.
    pub entities: Vec<Entity>,
    /// `None` when no specific relationship is asked about.
    pub relationship: Option<RelationshipType>,
    /// Confidence in the analysis (0.0-1.0). Always 0 for fallback analyses.
    pub confidence: f32,
}

impl QueryAnalysis {
    /// Heuristic analysis used whenever LLM extraction is unavailable or untrusted.
    pub fn fallback(entities: Vec<Entity>) -> Self {
        Self {
            intent: QueryIntent::Identification,
            entities,
            relationship: None,
            confidence: 0.0,
        }
    }

    /// Whether this analysis came from the heuristic fallback.
    pub fn is_fallback(&self) -> bool {
        self.confidence <= 0.0
    }

    /// Entity names of a given type, in order of mention.
    pub fn names_of(&self, entity_type: EntityType) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .map(|e| e.name.as_str())
            .collect()
    }
}
