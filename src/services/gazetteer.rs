//! Keyword entity matcher used when LLM extraction is unavailable.

use crate::domain::models::{Entity, EntityType};

/// Case-insensitive phrases matched on word boundaries.
const PHRASES: &[(EntityType, &[&str])] = &[
    (
        EntityType::Disease,
        &[
            "breast cancer",
            "ovarian cancer",
            "lung cancer",
            "prostate cancer",
            "colorectal cancer",
            "pancreatic cancer",
            "cancer",
            "type 2 diabetes",
            "type 1 diabetes",
            "diabetes",
            "alzheimer's disease",
            "alzheimer",
            "parkinson's disease",
            "parkinson",
            "huntington's disease",
            "cystic fibrosis",
            "sickle cell anemia",
            "leukemia",
            "lymphoma",
            "melanoma",
            "glioblastoma",
            "asthma",
            "hypertension",
            "atherosclerosis",
            "rheumatoid arthritis",
            "multiple sclerosis",
            "covid-19",
            "tuberculosis",
            "malaria",
        ],
    ),
    (
        EntityType::Pathway,
        &[
            "apoptosis",
            "autophagy",
            "glycolysis",
            "cell cycle",
            "dna repair",
            "homologous recombination",
            "mtor signaling",
            "wnt signaling",
            "notch signaling",
            "insulin signaling",
            "mapk signaling",
            "jak-stat signaling",
            "nf-kb signaling",
            "p53 pathway",
            "oxidative phosphorylation",
        ],
    ),
    (
        EntityType::Drug,
        &[
            "metformin",
            "aspirin",
            "tamoxifen",
            "imatinib",
            "trastuzumab",
            "olaparib",
            "ibuprofen",
            "warfarin",
            "clopidogrel",
            "atorvastatin",
            "simvastatin",
            "statins",
            "cisplatin",
            "paclitaxel",
            "doxorubicin",
            "pembrolizumab",
            "gefitinib",
            "erlotinib",
        ],
    ),
    (
        EntityType::Phenotype,
        &[
            "insulin resistance",
            "obesity",
            "inflammation",
            "fibrosis",
            "neurodegeneration",
            "drug resistance",
        ],
    ),
    (
        EntityType::CellType,
        &[
            "t cell",
            "t cells",
            "b cell",
            "b cells",
            "stem cell",
            "stem cells",
            "neuron",
            "neurons",
            "macrophage",
            "macrophages",
            "hepatocyte",
            "hepatocytes",
            "fibroblast",
            "fibroblasts",
        ],
    ),
    (
        EntityType::Tissue,
        &[
            "liver", "brain", "lung", "kidney", "heart", "pancreas", "breast", "skin", "blood",
            "muscle",
        ],
    ),
    (
        EntityType::Organism,
        &[
            "human",
            "mouse",
            "mice",
            "rat",
            "zebrafish",
            "yeast",
            "drosophila",
            "e. coli",
            "c. elegans",
        ],
    ),
    (
        EntityType::Chemical,
        &["glucose", "cholesterol", "ethanol", "atp", "nad+", "dopamine"],
    ),
];

/// Gene symbols without digits that the shape rule would miss.
const GENE_SYMBOLS: &[&str] = &[
    "EGFR", "KRAS", "NRAS", "HRAS", "BRAF", "MYC", "PTEN", "APOE", "CFTR", "ERBB2", "HER2", "ALK",
    "TNF", "VEGFA", "ESR1", "BCL2", "HBB", "HTT", "SNCA", "APP", "MAPT", "LRRK2", "ATM", "PALB2",
    "MTOR", "AKT1", "PIK3CA", "RB1", "VHL", "NOTCH1", "INS",
];

/// Matched span in the query text.
struct Hit {
    start: usize,
    end: usize,
    entity: Entity,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'\''
}

fn bounded(haystack: &[u8], start: usize, end: usize) -> bool {
    let before = start == 0 || !is_word_byte(haystack[start - 1]);
    let after = end == haystack.len() || !is_word_byte(haystack[end]);
    before && after
}

fn overlaps(hits: &[Hit], start: usize, end: usize) -> bool {
    hits.iter().any(|h| start < h.end && h.start < end)
}

fn looks_like_gene_symbol(token: &str) -> bool {
    let len = token.len();
    (2..=10).contains(&len)
        && token.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && token.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && token.chars().any(|c| c.is_ascii_digit())
        && !token.starts_with("RS")
}

fn is_rsid(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    lower.len() > 2 && lower.starts_with("rs") && lower[2..].chars().all(|c| c.is_ascii_digit())
}

/// Find biological entities by keyword, in order of first mention.
///
/// Gene symbols are typed as proteins when the query talks about proteins.
pub fn match_entities(text: &str) -> Vec<Entity> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut hits: Vec<Hit> = Vec::new();

    // Longest phrases first so "breast cancer" wins over "breast".
    let mut phrases: Vec<(EntityType, &str)> = PHRASES
        .iter()
        .flat_map(|(kind, words)| words.iter().map(move |w| (*kind, *w)))
        .collect();
    phrases.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    for (kind, phrase) in phrases {
        let mut from = 0;
        while let Some(offset) = lower[from..].find(phrase) {
            let start = from + offset;
            let end = start + phrase.len();
            if bounded(bytes, start, end) && !overlaps(&hits, start, end) {
                hits.push(Hit {
                    start,
                    end,
                    entity: Entity::new(kind, &text[start..end]),
                });
            }
            from = end;
        }
    }

    let gene_type = if lower.contains("protein") {
        EntityType::Protein
    } else {
        EntityType::Gene
    };

    let mut offset = 0;
    for token in text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '-')) {
        let start = text[offset..].find(token).map_or(offset, |i| offset + i);
        let end = start + token.len();
        offset = end;
        if token.is_empty() || overlaps(&hits, start, end) {
            continue;
        }
        let kind = if is_rsid(token) {
            Some(EntityType::Variant)
        } else if looks_like_gene_symbol(token) || GENE_SYMBOLS.contains(&token) {
            Some(gene_type)
        } else {
            None
        };
        if let Some(kind) = kind {
            hits.push(Hit {
                start,
                end,
                entity: Entity::new(kind, token),
            });
        }
    }

    hits.sort_by_key(|h| h.start);
    let mut entities: Vec<Entity> = Vec::with_capacity(hits.len());
    for hit in hits {
        let duplicate = entities.iter().any(|e| {
            e.entity_type == hit.entity.entity_type && e.name.eq_ignore_ascii_case(&hit.entity.name)
        });
        if !duplicate {
            entities.push(hit.entity);
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protein_context_types_symbols_as_proteins() {
        let entities = match_entities("What proteins interact with BRCA1?");
        assert_eq!(entities, vec![Entity::new(EntityType::Protein, "BRCA1")]);
    }

    #[test]
    fn test_gene_and_disease_in_mention_order() {
        let entities = match_entities("Is TP53 associated with breast cancer in mice?");
        assert_eq!(
            entities,
            vec![
                Entity::new(EntityType::Gene, "TP53"),
                Entity::new(EntityType::Disease, "breast cancer"),
                Entity::new(EntityType::Organism, "mice"),
            ]
        );
    }

    #[test]
    fn test_rsid_is_variant() {
        let entities = match_entities("What does rs429358 do to APOE?");
        assert_eq!(entities[0], Entity::new(EntityType::Variant, "rs429358"));
        assert_eq!(entities[1], Entity::new(EntityType::Gene, "APOE"));
    }

    #[test]
    fn test_no_partial_word_matches() {
        assert!(match_entities("Describe the heartbeat of cancerous growth").is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let entities = match_entities("metformin vs Metformin");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_type, EntityType::Drug);
    }

    #[test]
    fn test_empty_text() {
        assert!(match_entities("").is_empty());
        assert!(match_entities("hello there").is_empty());
    }
}
