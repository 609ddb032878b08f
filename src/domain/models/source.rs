//! Source identifiers and source plans.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of sources in a plan.
pub const MAX_PLAN_LENGTH: usize = 5;

/// An external biological database reachable through a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// NCBI PubMed literature search
    Literature,
    /// UniProt protein knowledge base
    #[serde(rename = "uniprot")]
    UniProt,
    /// STRING protein-protein interaction network
    String,
    /// EBI IntAct molecular interactions
    #[serde(rename = "intact")]
    IntAct,
    /// BioGRID interaction repository
    #[serde(rename = "biogrid")]
    BioGrid,
    /// NHGRI-EBI GWAS Catalog
    Gwas,
    /// Open Targets target analysis
    TargetAnalysis,
    /// Open Targets disease analysis
    DiseaseAnalysis,
    /// Reactome pathway analysis
    Pathways,
    /// ChEMBL bioactive molecules
    Chembl,
    /// PharmGKB clinical annotations
    #[serde(rename = "pharmgkb")]
    PharmGkb,
    /// Ensembl variant lookup
    Variants,
}

impl SourceId {
    /// Every known source, in catalog order.
    pub const ALL: [Self; 12] = [
        Self::Literature,
        Self::UniProt,
        Self::String,
        Self::IntAct,
        Self::BioGrid,
        Self::Gwas,
        Self::TargetAnalysis,
        Self::DiseaseAnalysis,
        Self::Pathways,
        Self::Chembl,
        Self::PharmGkb,
        Self::Variants,
    ];

    /// Stable wire name, used as the LLM tool name and in citations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Literature => "literature",
            Self::UniProt => "uniprot",
            Self::String => "string",
            Self::IntAct => "intact",
            Self::BioGrid => "biogrid",
            Self::Gwas => "gwas",
            Self::TargetAnalysis => "target_analysis",
            Self::DiseaseAnalysis => "disease_analysis",
            Self::Pathways => "pathways",
            Self::Chembl => "chembl",
            Self::PharmGkb => "pharmgkb",
            Self::Variants => "variants",
        }
    }

    /// Human readable database name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Literature => "PubMed",
            Self::UniProt => "UniProt",
            Self::String => "STRING",
            Self::IntAct => "IntAct",
            Self::BioGrid => "BioGRID",
            Self::Gwas => "GWAS Catalog",
            Self::TargetAnalysis => "Open Targets (target)",
            Self::DiseaseAnalysis => "Open Targets (disease)",
            Self::Pathways => "Reactome",
            Self::Chembl => "ChEMBL",
            Self::PharmGkb => "PharmGKB",
            Self::Variants => "Ensembl",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|id| id.as_str() == normalized)
    }

    /// Protein interaction network sources.
    pub fn is_interaction_network(&self) -> bool {
        matches!(self, Self::String | Self::IntAct | Self::BioGrid)
    }

    /// Literature sources.
    pub fn is_literature(&self) -> bool {
        matches!(self, Self::Literature)
    }

    /// Drug and pharmacogenomic sources.
    pub fn is_pharmacological(&self) -> bool {
        matches!(self, Self::Chembl | Self::PharmGkb)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, duplicate-free, capped sequence of sources to consult.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseSequence(Vec<SourceId>);

impl DatabaseSequence {
    /// Build a plan from ranked sources: duplicates dropped (first occurrence wins),
    /// then truncated to `cap` (never more than [`MAX_PLAN_LENGTH`]).
    pub fn from_ranked(ranked: impl IntoIterator<Item = SourceId>, cap: usize) -> Self {
        let cap = cap.min(MAX_PLAN_LENGTH);
        let mut sources: Vec<SourceId> = Vec::with_capacity(cap);
        for source in ranked {
            if sources.len() == cap {
                break;
            }
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        Self(sources)
    }

    pub fn sources(&self) -> &[SourceId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, source: SourceId) -> bool {
        self.0.contains(&source)
    }

    /// Position of a source in the plan, if planned.
    pub fn rank_of(&self, source: SourceId) -> Option<usize> {
        self.0.iter().position(|s| *s == source)
    }

    pub fn iter(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for DatabaseSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(SourceId::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
