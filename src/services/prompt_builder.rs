//! Domain-specific system prompt composed from a query analysis.

use std::fmt::Write as _;

use crate::domain::models::{DatabaseSequence, EntityType, QueryAnalysis, QueryIntent, RelationshipType};

const PERSONA: &str = "You are BioChat, a specialized AI assistant for biological and medical research with expertise in multiple biological databases. Use the available tools to gather evidence before answering.";

const SYNTHESIS: &str = "## Data Synthesis Instructions
1. Integrate information across multiple databases to provide a comprehensive view.
2. Highlight agreements and contradictions in the data.
3. Cite the specific data sources for key claims, by tool name.
4. Begin with a concise executive summary, then give detailed analysis organized by key concepts.
5. Define specialized terms.
6. Indicate confidence levels and limitations in the available data, including sources that failed or returned nothing.";

/// Appended when the loop is cut short.
pub const FORCED_SYNTHESIS: &str = "Stop requesting tools. Answer the original question now using only the evidence already gathered. State clearly which parts of the question could not be covered.";

fn intent_instructions(intent: QueryIntent) -> &'static str {
    match intent {
        QueryIntent::Explanation => "Focus on clearly explaining biological mechanisms and pathways. Highlight causal relationships and provide molecular details when available. Build from simpler concepts to more complex ones.",
        QueryIntent::Prediction => "Focus on evidence-based predictions, distinguishing well-established relationships from speculative ones. Quantify confidence using statistics from the data and note contradictory evidence.",
        QueryIntent::Comparison => "Structure the answer as a systematic comparison of similarities and differences, organized by key features.",
        QueryIntent::Identification => "Focus on the defining characteristics and properties of the entities, from most distinctive to more general. Include relevant classification and nomenclature.",
        QueryIntent::Mechanism => "Give step-by-step explanations of molecular and cellular mechanisms, in temporal order, connecting molecular events to higher-level outcomes.",
        QueryIntent::Treatment => "Focus on evidence-based treatment approaches, prioritizing clinical evidence. Separate established treatments from experimental ones and cover efficacy, safety and mechanism of action.",
        QueryIntent::Diagnosis => "Provide diagnostic criteria and relevant biomarkers, how conditions are differentiated, and how diagnostic tests are interpreted.",
    }
}

fn entity_instructions(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Gene | EntityType::Protein => "For genes and proteins, emphasize primary function, key pathways and interaction partners, disease associations, and structural or regulatory features.",
        EntityType::Disease => "For diseases, emphasize molecular mechanisms, genetic and environmental factors, current therapies, and diagnostic biomarkers.",
        EntityType::Drug | EntityType::Chemical => "For drugs and chemicals, emphasize mechanism of action and targets, pharmacokinetics, clinical applications, and safety profile.",
        EntityType::Pathway => "For pathways, emphasize component genes and proteins, regulatory control points, outcomes, and cross-talk with other pathways.",
        EntityType::Variant => "For genetic variants, emphasize location and nature, functional consequences, associated phenotypes, and population frequencies.",
        EntityType::Phenotype => "For phenotypes, emphasize clinical manifestations, underlying mechanisms, and genetic and environmental influences.",
        EntityType::CellType | EntityType::Tissue => "For cells and tissues, emphasize functional characteristics, signaling, physiological roles, and changes in disease.",
        EntityType::Organism => "For organisms, emphasize relevance as a model system and how findings translate to humans.",
    }
}

fn relationship_instructions(relationship: RelationshipType) -> &'static str {
    match relationship {
        RelationshipType::Causal => "Clearly distinguish correlation from causation, highlighting direct evidence for causal relationships.",
        RelationshipType::Associative => "Present statistical associations with context about study design and potential confounders.",
        RelationshipType::Regulatory => "Detail the direction and magnitude of regulatory effects and the mechanisms involved.",
        RelationshipType::Structural => "Include specific structural details, interactions, and spatial relationships when available.",
        RelationshipType::Functional => "Explain how functional relationships manifest and their biological significance.",
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

/// Build the system prompt for a query.
///
/// The plan is rendered as a suggested tool order. The model may pick a
/// subset or another order.
pub fn system_prompt(analysis: &QueryAnalysis, plan: &DatabaseSequence) -> String {
    let mut prompt = String::from(PERSONA);
    prompt.push_str("\n\n");

    let _ = write!(
        prompt,
        "## Query Intent: {}\n{}\n\n",
        title_case(analysis.intent.as_str()),
        intent_instructions(analysis.intent)
    );

    let mut blocks: Vec<&str> = Vec::new();
    for entity in &analysis.entities {
        let block = entity_instructions(entity.entity_type);
        if !blocks.contains(&block) {
            blocks.push(block);
        }
    }
    if !blocks.is_empty() {
        prompt.push_str("## Entity Focus\n");
        let mentioned: Vec<String> = analysis
            .entities
            .iter()
            .map(|e| format!("{} ({})", e.name, e.entity_type))
            .collect();
        let _ = writeln!(prompt, "Entities in the question: {}", mentioned.join(", "));
        for block in blocks {
            let _ = writeln!(prompt, "- {block}");
        }
        prompt.push('\n');
    }

    if let Some(relationship) = analysis.relationship {
        let _ = write!(
            prompt,
            "## Relationship Focus: {}\n{}\n\n",
            title_case(relationship.as_str()),
            relationship_instructions(relationship)
        );
    }

    if !plan.is_empty() {
        let order: Vec<&str> = plan.iter().map(|s| s.as_str()).collect();
        let _ = write!(
            prompt,
            "## Suggested Sources\nThe most relevant tools for this question are, in order: {}. This is a suggestion: call the tools that best answer the question.\n\n",
            order.join(", ")
        );
    }

    prompt.push_str(SYNTHESIS);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Entity, SourceId};

    #[test]
    fn test_prompt_sections() {
        let analysis = QueryAnalysis {
            intent: QueryIntent::Mechanism,
            entities: vec![
                Entity::new(EntityType::Gene, "BRCA1"),
                Entity::new(EntityType::Protein, "BARD1"),
                Entity::new(EntityType::Disease, "breast cancer"),
            ],
            relationship: Some(RelationshipType::Regulatory),
            confidence: 0.9,
        };
        let plan = DatabaseSequence::from_ranked([SourceId::String, SourceId::Literature], 5);
        let prompt = system_prompt(&analysis, &plan);

        assert!(prompt.starts_with(PERSONA));
        assert!(prompt.contains("## Query Intent: Mechanism"));
        assert!(prompt.contains("BRCA1 (gene), BARD1 (protein), breast cancer (disease)"));
        assert_eq!(prompt.matches("For genes and proteins").count(), 1);
        assert!(prompt.contains("## Relationship Focus: Regulatory"));
        assert!(prompt.contains("in order: string, literature"));
        assert!(prompt.ends_with(SYNTHESIS));
    }

    #[test]
    fn test_fallback_analysis_prompt() {
        let analysis = QueryAnalysis::fallback(Vec::new());
        let prompt = system_prompt(&analysis, &DatabaseSequence::from_ranked([], 5));
        assert!(prompt.contains("## Query Intent: Identification"));
        assert!(!prompt.contains("## Entity Focus"));
        assert!(!prompt.contains("## Relationship Focus"));
        assert!(!prompt.contains("## Suggested Sources"));
    }
}
