//! Knowledge-graph router.
//!
//! Maps a `QueryAnalysis` to an ordered source plan through static
//! entity-type tables. Pure and deterministic: no I/O, no randomness, no
//! hash-order iteration.

use tracing::debug;

use crate::domain::models::{
    DatabaseSequence, EntityType, QueryAnalysis, QueryIntent, RelationshipType, SourceId,
    MAX_PLAN_LENGTH,
};

use EntityType as E;
use SourceId as S;

/// Sources for an unordered pair of entity types. Keys are stored with the
/// smaller type first.
const PAIR_TABLE: &[((EntityType, EntityType), &[SourceId])] = &[
    ((E::Gene, E::Gene), &[S::String, S::BioGrid, S::IntAct]),
    ((E::Gene, E::Protein), &[S::UniProt, S::Literature]),
    ((E::Gene, E::Pathway), &[S::Pathways, S::Literature]),
    ((E::Gene, E::Disease), &[S::Literature, S::Gwas, S::TargetAnalysis]),
    ((E::Gene, E::Drug), &[S::TargetAnalysis, S::Chembl, S::PharmGkb]),
    ((E::Gene, E::Variant), &[S::Variants, S::Gwas]),
    ((E::Protein, E::Protein), &[S::String, S::IntAct, S::BioGrid, S::Literature]),
    ((E::Protein, E::Pathway), &[S::Pathways, S::Literature]),
    ((E::Protein, E::Disease), &[S::TargetAnalysis, S::Literature]),
    ((E::Protein, E::Drug), &[S::TargetAnalysis, S::Chembl, S::Literature]),
    ((E::Pathway, E::Disease), &[S::Pathways, S::Literature]),
    ((E::Pathway, E::Drug), &[S::Literature, S::Pathways]),
    ((E::Disease, E::Drug), &[S::DiseaseAnalysis, S::Literature, S::PharmGkb]),
    ((E::Disease, E::Variant), &[S::Gwas, S::Variants, S::Literature]),
    ((E::Drug, E::Drug), &[S::Literature, S::Chembl]),
    ((E::Drug, E::Chemical), &[S::Chembl, S::PharmGkb]),
    ((E::Variant, E::Phenotype), &[S::Gwas, S::Literature]),
];

/// Sources for a single entity type.
const SINGLE_TABLE: &[(EntityType, &[SourceId])] = &[
    (E::Gene, &[S::UniProt, S::Literature, S::Pathways]),
    (E::Protein, &[S::UniProt, S::String, S::IntAct, S::BioGrid]),
    (E::Pathway, &[S::Pathways, S::Literature]),
    (E::Disease, &[S::Literature, S::DiseaseAnalysis]),
    (E::Drug, &[S::Chembl, S::PharmGkb]),
    (E::Variant, &[S::Variants, S::Gwas]),
    (E::Chemical, &[S::Chembl]),
    (E::Phenotype, &[S::Gwas, S::Literature]),
];

fn pair_key(a: EntityType, b: EntityType) -> (EntityType, EntityType) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn lookup_pair(a: EntityType, b: EntityType) -> Option<&'static [SourceId]> {
    let key = pair_key(a, b);
    PAIR_TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, sources)| *sources)
}

fn lookup_single(entity_type: EntityType) -> Option<&'static [SourceId]> {
    SINGLE_TABLE
        .iter()
        .find(|(k, _)| *k == entity_type)
        .map(|(_, sources)| *sources)
}

/// Reorder the slots holding `promoted` or `demoted` sources so promoted ones
/// come first. Other sources keep their positions; ties keep table order.
fn promote(
    sources: &mut [SourceId],
    promoted: impl Fn(SourceId) -> bool,
    demoted: impl Fn(SourceId) -> bool,
) {
    let slots: Vec<usize> = (0..sources.len())
        .filter(|&i| promoted(sources[i]) || demoted(sources[i]))
        .collect();
    let mut reordered: Vec<SourceId> = slots.iter().map(|&i| sources[i]).collect();
    reordered.sort_by_key(|s| !promoted(*s));
    for (slot, source) in slots.into_iter().zip(reordered) {
        sources[slot] = source;
    }
}

/// Candidate sources before re-ranking, in table order.
fn candidates(analysis: &QueryAnalysis) -> Vec<SourceId> {
    let types: Vec<EntityType> = analysis.entities.iter().map(|e| e.entity_type).collect();
    let mut ranked = Vec::new();

    if types.len() >= 2 {
        let mut seen_pairs = Vec::new();
        for i in 0..types.len() {
            for j in (i + 1)..types.len() {
                let key = pair_key(types[i], types[j]);
                if seen_pairs.contains(&key) {
                    continue;
                }
                seen_pairs.push(key);
                if let Some(sources) = lookup_pair(types[i], types[j]) {
                    ranked.extend_from_slice(sources);
                }
            }
        }
    }

    if ranked.is_empty() {
        let mut seen_types = Vec::new();
        for entity_type in types {
            if seen_types.contains(&entity_type) {
                continue;
            }
            seen_types.push(entity_type);
            if let Some(sources) = lookup_single(entity_type) {
                ranked.extend_from_slice(sources);
            }
        }
    }

    if ranked.is_empty() {
        ranked.push(SourceId::Literature);
    }
    ranked
}

/// Build the source plan for an analysis, capped at `max_sources` (at most 5).
pub fn route_with_cap(analysis: &QueryAnalysis, max_sources: usize) -> DatabaseSequence {
    let mut ranked = candidates(analysis);

    if analysis.relationship == Some(RelationshipType::Regulatory) {
        promote(&mut ranked, |s| s.is_interaction_network(), |s| s.is_literature());
    }
    if analysis.intent == QueryIntent::Treatment {
        promote(&mut ranked, |s| s.is_pharmacological(), |_| true);
    }

    let plan = DatabaseSequence::from_ranked(ranked, max_sources.max(1));
    debug!(plan = %plan, intent = %analysis.intent, "source plan");
    plan
}

/// Build the source plan for an analysis with the default cap.
pub fn route(analysis: &QueryAnalysis) -> DatabaseSequence {
    route_with_cap(analysis, MAX_PLAN_LENGTH)
}

/// Router bound to a configured plan cap.
#[derive(Debug, Clone, Copy)]
pub struct SourceRouter {
    max_sources: usize,
}

impl Default for SourceRouter {
    fn default() -> Self {
        Self::new(MAX_PLAN_LENGTH)
    }
}

impl SourceRouter {
    pub fn new(max_sources: usize) -> Self {
        Self {
            max_sources: max_sources.clamp(1, MAX_PLAN_LENGTH),
        }
    }

    pub fn route(&self, analysis: &QueryAnalysis) -> DatabaseSequence {
        route_with_cap(analysis, self.max_sources)
    }
}
