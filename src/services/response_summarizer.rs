//! Default response summarizer.
//!
//! Each source has a strategy naming where its records live and which fields
//! matter. The summary keeps the top records and those fields only. Anything
//! that still does not fit is serialized and truncated.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::context_truncation::truncate_to_chars;
use crate::domain::models::SourceId;
use crate::domain::ports::ResponseSummarizer;

/// Records kept per summary.
const TOP_RECORDS: usize = 5;

/// Where a source's records live and what to keep from each.
struct Strategy {
    /// JSON pointer to the record collection (array, or object of records).
    records: &'static str,
    /// Optional JSON pointer to a total count.
    total: Option<&'static str>,
    /// Output label and JSON pointer within a record.
    fields: &'static [(&'static str, &'static str)],
}

const ARTICLES: Strategy = Strategy {
    records: "/articles",
    total: Some("/count"),
    fields: &[
        ("pmid", "/pmid"),
        ("title", "/title"),
        ("journal", "/journal"),
        ("year", "/year"),
    ],
};

const PMIDS: Strategy = Strategy {
    records: "/esearchresult/idlist",
    total: Some("/esearchresult/count"),
    fields: &[("pmid", "")],
};

const UNIPROT_ENTRIES: Strategy = Strategy {
    records: "/results",
    total: None,
    fields: &[
        ("accession", "/primaryAccession"),
        ("entry", "/uniProtkbId"),
        ("name", "/proteinDescription/recommendedName/fullName/value"),
        ("gene", "/genes/0/geneName/value"),
        ("function", "/comments/0/texts/0/value"),
    ],
};

const STRING_EDGES: Strategy = Strategy {
    records: "",
    total: None,
    fields: &[
        ("protein_a", "/preferredName_A"),
        ("protein_b", "/preferredName_B"),
        ("score", "/score"),
    ],
};

const INTACT_INTERACTIONS: Strategy = Strategy {
    records: "/content",
    total: Some("/totalElements"),
    fields: &[
        ("interactor_a", "/moleculeA"),
        ("interactor_b", "/moleculeB"),
        ("interaction_type", "/type"),
        ("score", "/intactMiscore"),
    ],
};

const BIOGRID_INTERACTIONS: Strategy = Strategy {
    records: "",
    total: None,
    fields: &[
        ("interactor_a", "/OFFICIAL_SYMBOL_A"),
        ("interactor_b", "/OFFICIAL_SYMBOL_B"),
        ("experimental_system", "/EXPERIMENTAL_SYSTEM"),
        ("pubmed_id", "/PUBMED_ID"),
    ],
};

const GWAS_SNPS: Strategy = Strategy {
    records: "/_embedded/singleNucleotidePolymorphisms",
    total: Some("/page/totalElements"),
    fields: &[
        ("rs_id", "/rsId"),
        ("functional_class", "/functionalClass"),
        ("merged", "/merged"),
    ],
};

const KNOWN_DRUGS: Strategy = Strategy {
    records: "/target/knownDrugs/rows",
    total: Some("/target/knownDrugs/count"),
    fields: &[
        ("name", "/drug/name"),
        ("drug_type", "/drug/drugType"),
        ("status", "/status"),
        ("mechanism", "/mechanismOfAction"),
        ("disease_name", "/disease/name"),
        ("phase", "/phase"),
    ],
};

const ASSOCIATED_TARGETS: Strategy = Strategy {
    records: "/disease/associatedTargets/rows",
    total: Some("/disease/associatedTargets/count"),
    fields: &[
        ("target", "/target/approvedSymbol"),
        ("ensembl_id", "/target/id"),
        ("score", "/score"),
    ],
};

const SEARCH_HITS: Strategy = Strategy {
    records: "/search/hits",
    total: None,
    fields: &[("id", "/id"), ("name", "/name"), ("description", "/description")],
};

const REACTOME_PATHWAYS: Strategy = Strategy {
    records: "/results/0/entries",
    total: None,
    fields: &[
        ("pathway_id", "/stId"),
        ("name", "/name"),
        ("species", "/species/0"),
    ],
};

const CHEMBL_ACTIVITIES: Strategy = Strategy {
    records: "/activities",
    total: Some("/page_meta/total_count"),
    fields: &[
        ("molecule", "/molecule_pref_name"),
        ("molecule_chembl_id", "/molecule_chembl_id"),
        ("target", "/target_pref_name"),
        ("organism", "/target_organism"),
        ("standard_type", "/standard_type"),
        ("standard_value", "/standard_value"),
        ("standard_units", "/standard_units"),
        ("pchembl_value", "/pchembl_value"),
    ],
};

const CHEMBL_MOLECULES: Strategy = Strategy {
    records: "/molecules",
    total: Some("/page_meta/total_count"),
    fields: &[
        ("chembl_id", "/molecule_chembl_id"),
        ("pref_name", "/pref_name"),
        ("molecule_type", "/molecule_type"),
        ("max_phase", "/max_phase"),
    ],
};

const CHEMBL_TARGETS: Strategy = Strategy {
    records: "/targets",
    total: Some("/page_meta/total_count"),
    fields: &[
        ("target_chembl_id", "/target_chembl_id"),
        ("pref_name", "/pref_name"),
        ("target_type", "/target_type"),
        ("organism", "/organism"),
    ],
};

const PHARMGKB_RECORDS: Strategy = Strategy {
    records: "/data",
    total: None,
    fields: &[
        ("pharmgkb_id", "/id"),
        ("accession", "/accessionId"),
        ("name", "/name"),
        ("types", "/types"),
        ("evidence_level", "/levelOfEvidence/term"),
        ("location", "/location/displayName"),
        ("chemical", "/relatedChemicals/0/name"),
        ("sentence", "/sentence"),
    ],
};

/// Candidate strategies for a source, most specific first.
fn strategies_for(source: SourceId) -> &'static [Strategy] {
    match source {
        SourceId::Literature => &[ARTICLES, PMIDS],
        SourceId::UniProt => &[UNIPROT_ENTRIES],
        SourceId::String => &[STRING_EDGES],
        SourceId::IntAct => &[INTACT_INTERACTIONS],
        SourceId::BioGrid => &[BIOGRID_INTERACTIONS],
        SourceId::Gwas => &[GWAS_SNPS],
        SourceId::TargetAnalysis => &[KNOWN_DRUGS, SEARCH_HITS],
        SourceId::DiseaseAnalysis => &[ASSOCIATED_TARGETS, SEARCH_HITS],
        SourceId::Pathways => &[REACTOME_PATHWAYS],
        SourceId::Chembl => &[CHEMBL_ACTIVITIES, CHEMBL_MOLECULES, CHEMBL_TARGETS],
        SourceId::PharmGkb => &[PHARMGKB_RECORDS],
        SourceId::Variants => &[],
    }
}

/// Records at `pointer`. Arrays as-is; objects of records as their values;
/// any other object below the root as a single record.
fn records_at<'a>(payload: &'a Value, pointer: &str) -> Option<Vec<&'a Value>> {
    match payload.pointer(pointer)? {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Object(map) if !map.is_empty() && map.values().all(Value::is_object) => {
            Some(map.values().collect())
        }
        record @ Value::Object(_) if !pointer.is_empty() => Some(vec![record]),
        _ => None,
    }
}

fn apply(strategy: &Strategy, payload: &Value) -> Option<Value> {
    let records = records_at(payload, strategy.records)?;
    let total = strategy
        .total
        .and_then(|p| payload.pointer(p))
        .cloned()
        .unwrap_or_else(|| json!(records.len()));

    let top: Vec<Value> = records
        .into_iter()
        .take(TOP_RECORDS)
        .map(|record| {
            let mut kept = Map::new();
            for (label, pointer) in strategy.fields {
                if let Some(value) = record.pointer(pointer) {
                    if !value.is_null() {
                        kept.insert((*label).to_string(), value.clone());
                    }
                }
            }
            Value::Object(kept)
        })
        .collect();

    Some(json!({
        "total": total,
        "top": top,
        "summary_timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Truncate `text` into a JSON string whose encoding is at most `target_chars`.
fn fit_string(text: &str, target_chars: usize) -> Value {
    // Quotes and escapes added by the JSON string encoding count too.
    let mut budget = target_chars;
    loop {
        let truncated = Value::String(truncate_to_chars(text, budget));
        if truncated.to_string().len() <= target_chars || budget == 0 {
            return truncated;
        }
        budget = budget.saturating_sub(budget / 8 + 1);
    }
}

/// Per-source summarizer with a truncating fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSummarizer;

impl DefaultSummarizer {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core of [`ResponseSummarizer::summarize`].
    pub fn condense(&self, source: SourceId, payload: &Value, target_chars: usize) -> Value {
        if payload.to_string().len() <= target_chars {
            return payload.clone();
        }

        let summary = strategies_for(source)
            .iter()
            .find_map(|strategy| apply(strategy, payload));
        if let Some(summary) = summary {
            let rendered = summary.to_string();
            if rendered.len() <= target_chars {
                debug!(source = %source, chars = rendered.len(), "payload summarized");
                return summary;
            }
            return fit_string(&rendered, target_chars);
        }

        let pretty = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        debug!(source = %source, chars = pretty.len(), target_chars, "payload truncated");
        fit_string(&pretty, target_chars)
    }
}

#[async_trait]
impl ResponseSummarizer for DefaultSummarizer {
    async fn summarize(&self, source: SourceId, payload: &Value, target_chars: usize) -> Value {
        self.condense(source, payload, target_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_network(edges: usize) -> Value {
        Value::Array(
            (0..edges)
                .map(|i| {
                    json!({
                        "preferredName_A": "BRCA1",
                        "preferredName_B": format!("PARTNER{i}"),
                        "score": 0.9,
                        "stringId_A": "9606.ENSP00000350283",
                        "stringId_B": format!("9606.ENSP{i:011}"),
                        "ncbiTaxonId": 9606,
                        "nscore": 0, "fscore": 0, "pscore": 0, "ascore": 0.1,
                        "escore": 0.8, "dscore": 0.5, "tscore": 0.9
                    })
                })
                .collect(),
        )
    }

    #[test]
    fn test_small_payload_untouched() {
        let payload = json!({"results": []});
        let out = DefaultSummarizer::new().condense(SourceId::UniProt, &payload, 1_000);
        assert_eq!(out, payload);
    }

    #[test]
    fn test_string_keeps_top_five_edges() {
        let payload = string_network(50);
        let out = DefaultSummarizer::new().condense(SourceId::String, &payload, 2_000);

        assert_eq!(out["total"], 50);
        let top = out["top"].as_array().unwrap();
        assert_eq!(top.len(), 5);
        assert_eq!(top[0]["protein_a"], "BRCA1");
        assert!(top[0].get("stringId_A").is_none());
        assert!(out["summary_timestamp"].is_string());
    }

    #[test]
    fn test_biogrid_object_records() {
        let mut records = Map::new();
        for i in 0..20 {
            records.insert(
                format!("{}", 1000 + i),
                json!({
                    "OFFICIAL_SYMBOL_A": "BRCA1",
                    "OFFICIAL_SYMBOL_B": format!("G{i}"),
                    "EXPERIMENTAL_SYSTEM": "Two-hybrid",
                    "PUBMED_ID": 12345,
                    "SOURCEDB": "BIOGRID",
                    "THROUGHPUT": "Low Throughput"
                }),
            );
        }
        let payload = Value::Object(records);
        let out = DefaultSummarizer::new().condense(SourceId::BioGrid, &payload, 1_500);
        assert_eq!(out["top"].as_array().unwrap().len(), 5);
        assert_eq!(out["total"], 20);
    }

    #[test]
    fn test_unknown_shape_is_truncated_to_target() {
        let payload = json!({"blob": "x".repeat(5_000)});
        let out = DefaultSummarizer::new().condense(SourceId::Variants, &payload, 500);
        assert!(out.is_string());
        assert!(out.to_string().len() <= 500);
    }

    #[test]
    fn test_literature_articles_keep_citation_fields() {
        let articles: Vec<Value> = (0..20)
            .map(|i| {
                json!({
                    "pmid": format!("{}", 30_000_000 + i),
                    "title": format!("Study {i} of APOE and amyloid"),
                    "journal": "Neuron",
                    "year": "2020",
                    "authors": ["Doe J", "Roe R", "Poe P"]
                })
            })
            .collect();
        let payload = json!({"count": "57", "articles": articles});
        let out = DefaultSummarizer::new().condense(SourceId::Literature, &payload, 1_200);

        assert_eq!(out["total"], "57");
        let top = out["top"].as_array().unwrap();
        assert_eq!(top.len(), 5);
        assert_eq!(top[0]["title"], "Study 0 of APOE and amyloid");
        assert_eq!(top[0]["journal"], "Neuron");
        assert_eq!(top[0]["year"], "2020");
        assert!(top[0].get("authors").is_none());
    }

    #[test]
    fn test_chembl_activities_preferred_over_molecule() {
        let activities: Vec<Value> = (0..30)
            .map(|i| {
                json!({
                    "molecule_pref_name": "OLAPARIB",
                    "target_pref_name": format!("Target {i}"),
                    "standard_type": "IC50",
                    "standard_value": "5.0",
                    "standard_units": "nM",
                    "assay_description": "x".repeat(100)
                })
            })
            .collect();
        let payload = json!({
            "molecule": {"molecule_chembl_id": "CHEMBL521686", "pref_name": "OLAPARIB"},
            "activities": activities,
            "page_meta": {"total_count": 412}
        });
        let out = DefaultSummarizer::new().condense(SourceId::Chembl, &payload, 2_000);
        assert_eq!(out["total"], 412);
        assert_eq!(out["top"][0]["standard_type"], "IC50");
        assert!(out["top"][0].get("assay_description").is_none());
    }

    #[test]
    fn test_single_record_object() {
        let payload = json!({"data": {
            "accessionId": "1451159680",
            "sentence": "Allele A is associated with decreased response to clopidogrel.",
            "notes": "n".repeat(2_000)
        }});
        let out = DefaultSummarizer::new().condense(SourceId::PharmGkb, &payload, 1_000);
        assert_eq!(out["total"], 1);
        assert_eq!(out["top"][0]["accession"], "1451159680");
    }

    #[test]
    fn test_escaped_summary_fits_target() {
        let edges: Vec<Value> = (0..20)
            .map(|i| {
                json!({
                    "preferredName_A": "\"quoted\" \\ name".repeat(4),
                    "preferredName_B": format!("\"P{i}\""),
                    "score": 0.5
                })
            })
            .collect();
        let payload = Value::Array(edges);
        for target in [120, 250, 400] {
            let out = DefaultSummarizer::new().condense(SourceId::String, &payload, target);
            assert!(out.is_string());
            assert!(out.to_string().len() <= target, "target {target}: {}", out.to_string().len());
        }
    }

    #[tokio::test]
    async fn test_result_always_fits() {
        let payload = string_network(200);
        for target in [100, 400, 1_000] {
            let out = DefaultSummarizer::new()
                .summarize(SourceId::String, &payload, target)
                .await;
            assert!(out.to_string().len() <= target, "target {target}");
        }
    }
}
