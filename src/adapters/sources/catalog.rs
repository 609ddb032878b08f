//! Built-in source definitions for the public biological databases.

use serde_json::{json, Value};

use super::http::{second_payload, FollowUp, RequestParts, SourceDefinition};
use crate::domain::models::{Entity, EntityType, SourceId};
use crate::domain::ports::{ArgumentSchema, FieldKind, SourceError};

const HUMAN_TAXON: u32 = 9606;

fn names(entities: &[Entity], types: &[EntityType]) -> Vec<String> {
    entities
        .iter()
        .filter(|e| types.contains(&e.entity_type))
        .map(|e| e.name.clone())
        .collect()
}

fn first(entities: &[Entity], types: &[EntityType]) -> Option<String> {
    names(entities, types).into_iter().next()
}

fn str_arg<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn list_arg(arguments: &Value, key: &str) -> Vec<String> {
    arguments
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn int_arg(arguments: &Value, key: &str, default: i64) -> i64 {
    arguments.get(key).and_then(Value::as_i64).unwrap_or(default)
}

fn required(arguments: &Value, key: &str) -> Result<String, SourceError> {
    str_arg(arguments, key)
        .map(str::to_string)
        .ok_or_else(|| SourceError::InvalidArgument(format!("missing required argument '{key}'")))
}

fn not_found(what: &str, name: &str) -> SourceError {
    SourceError::Upstream {
        status: None,
        message: format!("no {what} matches '{name}'"),
        transient: false,
    }
}

/// Insert `key` into an object only when `value` is present.
fn with_optional(mut arguments: Value, key: &str, value: Option<String>) -> Value {
    if let (Value::Object(map), Some(value)) = (&mut arguments, value) {
        map.insert(key.to_string(), json!(value));
    }
    arguments
}

// --- NCBI PubMed ---

fn literature_arguments(entities: &[Entity]) -> Value {
    json!({
        "genes": names(entities, &[EntityType::Gene, EntityType::Protein]),
        "phenotypes": names(entities, &[EntityType::Disease, EntityType::Phenotype]),
        "additional_terms": names(
            entities,
            &[
                EntityType::Pathway,
                EntityType::Drug,
                EntityType::Variant,
                EntityType::Chemical,
                EntityType::CellType,
                EntityType::Tissue,
                EntityType::Organism,
            ],
        ),
    })
}

/// `(a OR b) AND (c)` over the non-empty term groups.
fn pubmed_term(arguments: &Value) -> String {
    ["genes", "phenotypes", "additional_terms"]
        .iter()
        .map(|key| list_arg(arguments, key))
        .filter(|group| !group.is_empty())
        .map(|group| format!("({})", group.join(" OR ")))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn literature_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    Ok(RequestParts::get(["esearch.fcgi"])
        .param("db", "pubmed")
        .param("term", pubmed_term(arguments))
        .param("retmax", int_arg(arguments, "max_results", 10))
        .param("retmode", "json")
        .param("sort", "relevance"))
}

/// Article summaries for the PMIDs the search found.
fn literature_summaries(_arguments: &Value, search: &Value) -> Result<Option<RequestParts>, SourceError> {
    let ids: Vec<&str> = search
        .pointer("/esearchresult/idlist")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    if ids.is_empty() {
        return Ok(None);
    }
    Ok(Some(
        RequestParts::get(["esummary.fcgi"])
            .param("db", "pubmed")
            .param("id", ids.join(","))
            .param("retmode", "json"),
    ))
}

fn article(pmid: &str, summary: &Value) -> Value {
    let year = summary
        .get("pubdate")
        .and_then(Value::as_str)
        .and_then(|date| date.split_whitespace().next())
        .unwrap_or_default();
    let authors: Vec<&str> = summary
        .get("authors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|author| author.get("name").and_then(Value::as_str))
        .take(3)
        .collect();
    json!({
        "pmid": pmid,
        "title": summary.get("title").cloned().unwrap_or(Value::Null),
        "journal": summary
            .get("fulljournalname")
            .or_else(|| summary.get("source"))
            .cloned()
            .unwrap_or(Value::Null),
        "year": year,
        "authors": authors,
    })
}

/// Hit count plus one record per summarized article, in search order.
fn literature_articles(_arguments: &Value, search: Value, summaries: Value) -> Value {
    let articles: Vec<Value> = summaries
        .pointer("/result/uids")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|pmid| {
            summaries
                .pointer(&format!("/result/{pmid}"))
                .map(|summary| article(pmid, summary))
        })
        .collect();
    json!({
        "count": search
            .pointer("/esearchresult/count")
            .cloned()
            .unwrap_or_else(|| json!(articles.len())),
        "articles": articles,
    })
}

fn literature() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::Literature,
        description: "Search scientific literature using NCBI PubMed. Use this for research papers, studies, or published findings.",
        base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils",
        schema: ArgumentSchema::new()
            .optional("genes", FieldKind::StringList, "Gene or protein symbols")
            .optional("phenotypes", FieldKind::StringList, "Diseases or phenotypes")
            .optional("additional_terms", FieldKind::StringList, "Other search terms")
            .optional("max_results", FieldKind::Integer, "Maximum number of articles")
            .at_least_one_of(&["genes", "phenotypes", "additional_terms"]),
        build_arguments: literature_arguments,
        request: literature_request,
        prerequisite: None,
        follow_up: Some(FollowUp {
            request: literature_summaries,
            combine: literature_articles,
        }),
        graphql: false,
    }
}

// --- UniProt ---

fn uniprot_arguments(entities: &[Entity]) -> Value {
    with_optional(
        json!({}),
        "protein_id",
        first(entities, &[EntityType::Protein, EntityType::Gene]),
    )
}

fn uniprot_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    let protein = required(arguments, "protein_id")?;
    Ok(RequestParts::get(["uniprotkb", "search"])
        .param(
            "query",
            format!("({protein}) AND organism_id:{HUMAN_TAXON} AND reviewed:true"),
        )
        .param(
            "fields",
            "accession,id,protein_name,gene_names,cc_function,xref_ensembl",
        )
        .param("format", "json")
        .param("size", int_arg(arguments, "size", 5)))
}

fn uniprot() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::UniProt,
        description: "Get detailed protein information (function, names, cross-references) from UniProt.",
        base_url: "https://rest.uniprot.org",
        schema: ArgumentSchema::new()
            .required("protein_id", FieldKind::String, "Protein name, gene symbol or UniProt accession")
            .optional("size", FieldKind::Integer, "Maximum number of entries"),
        build_arguments: uniprot_arguments,
        request: uniprot_request,
        prerequisite: None,
        follow_up: None,
        graphql: false,
    }
}

// --- STRING ---

fn string_arguments(entities: &[Entity]) -> Value {
    json!({ "identifiers": names(entities, &[EntityType::Protein, EntityType::Gene]) })
}

fn string_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    Ok(RequestParts::get(["json", "network"])
        .param("identifiers", list_arg(arguments, "identifiers").join("\r"))
        .param("species", int_arg(arguments, "species", i64::from(HUMAN_TAXON)))
        .param("required_score", int_arg(arguments, "required_score", 400))
        .param("caller_identity", "biochat"))
}

fn string_db() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::String,
        description: "Get protein-protein interaction networks from STRING-DB.",
        base_url: "https://version-12-0.string-db.org/api",
        schema: ArgumentSchema::new()
            .required("identifiers", FieldKind::StringList, "Protein names or identifiers")
            .optional("species", FieldKind::Integer, "NCBI taxon id (default 9606)")
            .optional("required_score", FieldKind::Integer, "Minimum combined score, 0-1000"),
        build_arguments: string_arguments,
        request: string_request,
        prerequisite: None,
        follow_up: None,
        graphql: false,
    }
}

// --- IntAct ---

fn intact_arguments(entities: &[Entity]) -> Value {
    with_optional(
        json!({}),
        "query",
        first(entities, &[EntityType::Protein, EntityType::Gene]),
    )
}

fn intact_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    let query = required(arguments, "query")?;
    Ok(RequestParts::get(["findInteractions".to_string(), query])
        .param("page", 0)
        .param("pageSize", int_arg(arguments, "page_size", 20)))
}

fn intact() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::IntAct,
        description: "Search molecular interactions in the IntAct database.",
        base_url: "https://www.ebi.ac.uk/intact/ws/interaction",
        schema: ArgumentSchema::new()
            .required("query", FieldKind::String, "Molecule name or identifier")
            .optional("page_size", FieldKind::Integer, "Maximum number of interactions"),
        build_arguments: intact_arguments,
        request: intact_request,
        prerequisite: None,
        follow_up: None,
        graphql: false,
    }
}

// --- BioGRID ---

fn biogrid_arguments(entities: &[Entity]) -> Value {
    json!({ "gene_list": names(entities, &[EntityType::Gene, EntityType::Protein]) })
}

fn biogrid_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    let include_interactors = arguments
        .get("include_interactors")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    Ok(RequestParts::get(["interactions"])
        .param("geneList", list_arg(arguments, "gene_list").join("|"))
        .param("searchNames", true)
        .param("includeInteractors", include_interactors)
        .param("taxId", HUMAN_TAXON)
        .param("max", int_arg(arguments, "max_results", 50))
        .param("format", "json"))
}

fn biogrid() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::BioGrid,
        description: "Get curated protein and genetic interaction data from BioGRID.",
        base_url: "https://webservice.thebiogrid.org",
        schema: ArgumentSchema::new()
            .required("gene_list", FieldKind::StringList, "Gene symbols")
            .optional("include_interactors", FieldKind::Boolean, "Include first-order interactors")
            .optional("max_results", FieldKind::Integer, "Maximum number of interactions"),
        build_arguments: biogrid_arguments,
        request: biogrid_request,
        prerequisite: None,
        follow_up: None,
        graphql: false,
    }
}

// --- GWAS Catalog ---

fn gwas_arguments(entities: &[Entity]) -> Value {
    let arguments = with_optional(json!({}), "gene", first(entities, &[EntityType::Gene]));
    with_optional(
        arguments,
        "trait",
        first(entities, &[EntityType::Disease, EntityType::Phenotype]),
    )
}

fn gwas_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    if let Some(gene) = str_arg(arguments, "gene") {
        return Ok(RequestParts::get([
            "singleNucleotidePolymorphisms",
            "search",
            "findByGene",
        ])
        .param("geneName", gene));
    }
    let trait_name = required(arguments, "trait")?;
    Ok(RequestParts::get([
        "singleNucleotidePolymorphisms",
        "search",
        "findByDiseaseTrait",
    ])
    .param("diseaseTrait", trait_name))
}

fn gwas() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::Gwas,
        description: "Search the GWAS Catalog for genetic associations with traits and diseases.",
        base_url: "https://www.ebi.ac.uk/gwas/rest/api",
        schema: ArgumentSchema::new()
            .optional("gene", FieldKind::String, "Gene symbol")
            .optional("trait", FieldKind::String, "Disease or trait name")
            .at_least_one_of(&["gene", "trait"]),
        build_arguments: gwas_arguments,
        request: gwas_request,
        prerequisite: None,
        follow_up: None,
        graphql: false,
    }
}

// --- Open Targets ---

const TARGET_QUERY: &str = "query target($ensemblId: String!) { target(ensemblId: $ensemblId) { id approvedSymbol approvedName knownDrugs(size: 10) { count rows { status phase mechanismOfAction drug { name drugType } disease { name } } } } }";

const DISEASE_QUERY: &str = "query disease($efoId: String!) { disease(efoId: $efoId) { id name description associatedTargets(page: {index: 0, size: 10}) { count rows { score target { id approvedSymbol } } } } }";

const DISEASE_SEARCH_QUERY: &str = "query search($q: String!) { search(queryString: $q, entityNames: [\"disease\"], page: {index: 0, size: 5}) { hits { id name description } } }";

const TARGET_SEARCH_QUERY: &str = "query search($q: String!) { search(queryString: $q, entityNames: [\"target\"], page: {index: 0, size: 5}) { hits { id name entity } } }";

/// Id of the search hit named `name`, else of the first hit.
fn best_hit<'a>(search: &'a Value, name: &str) -> Option<&'a str> {
    let hits = search.pointer("/search/hits").and_then(Value::as_array)?;
    hits.iter()
        .find(|hit| {
            hit.get("name")
                .and_then(Value::as_str)
                .is_some_and(|hit_name| hit_name.eq_ignore_ascii_case(name))
        })
        .or_else(|| hits.first())
        .and_then(|hit| hit.get("id").and_then(Value::as_str))
}

fn is_ensembl_gene(name: &str) -> bool {
    name.starts_with("ENSG") && name[4..].chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn target_arguments(entities: &[Entity]) -> Value {
    let symbol = first(entities, &[EntityType::Gene, EntityType::Protein]);
    match symbol {
        Some(id) if is_ensembl_gene(&id) => json!({ "target_id": id }),
        other => with_optional(json!({}), "gene_symbol", other),
    }
}

/// Take the Ensembl gene id from UniProt cross-references, version stripped.
fn target_from_uniprot(arguments: Value, upstream: &Value) -> Value {
    if str_arg(&arguments, "target_id").is_some() {
        return arguments;
    }
    let gene_id = upstream
        .pointer("/results/0/uniProtKBCrossReferences")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|xref| xref.get("database").and_then(Value::as_str) == Some("Ensembl"))
        .filter_map(|xref| xref.get("properties").and_then(Value::as_array))
        .flatten()
        .find(|p| p.get("key").and_then(Value::as_str) == Some("GeneId"))
        .and_then(|p| p.get("value").and_then(Value::as_str))
        .map(|id| id.split('.').next().unwrap_or(id).to_string());
    with_optional(arguments, "target_id", gene_id)
}

fn target_query(ensembl_id: &str) -> RequestParts {
    RequestParts::post(json!({
        "query": TARGET_QUERY,
        "variables": { "ensemblId": ensembl_id },
    }))
}

/// Target details by Ensembl id, or a target search by gene symbol.
fn target_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    if let Some(target) = str_arg(arguments, "target_id") {
        return Ok(target_query(target));
    }
    let symbol = required(arguments, "gene_symbol")?;
    Ok(RequestParts::post(json!({
        "query": TARGET_SEARCH_QUERY,
        "variables": { "q": symbol },
    })))
}

fn target_from_search(arguments: &Value, search: &Value) -> Result<Option<RequestParts>, SourceError> {
    if str_arg(arguments, "target_id").is_some() {
        return Ok(None);
    }
    let symbol = required(arguments, "gene_symbol")?;
    let ensembl_id = best_hit(search, &symbol).ok_or_else(|| not_found("Open Targets target", &symbol))?;
    Ok(Some(target_query(ensembl_id)))
}

fn target_analysis() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::TargetAnalysis,
        description: "Analyze a drug target (known drugs, mechanisms, indications) using the Open Targets Platform. Takes an Ensembl gene id or a gene symbol.",
        base_url: "https://api.platform.opentargets.org/api/v4/graphql",
        schema: ArgumentSchema::new()
            .optional("target_id", FieldKind::String, "Ensembl gene id, e.g. ENSG00000012048")
            .optional("gene_symbol", FieldKind::String, "Gene symbol, resolved to an Ensembl id")
            .at_least_one_of(&["target_id", "gene_symbol"]),
        build_arguments: target_arguments,
        request: target_request,
        prerequisite: Some((SourceId::UniProt, target_from_uniprot)),
        follow_up: Some(FollowUp {
            request: target_from_search,
            combine: second_payload,
        }),
        graphql: true,
    }
}

fn is_ontology_id(name: &str) -> bool {
    ["EFO_", "MONDO_", "Orphanet_", "HP_"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

fn disease_arguments(entities: &[Entity]) -> Value {
    match first(entities, &[EntityType::Disease, EntityType::Phenotype]) {
        Some(id) if is_ontology_id(&id) => json!({ "disease_id": id }),
        other => with_optional(json!({}), "disease_name", other),
    }
}

fn disease_query(efo_id: &str) -> RequestParts {
    RequestParts::post(json!({
        "query": DISEASE_QUERY,
        "variables": { "efoId": efo_id },
    }))
}

fn disease_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    if let Some(id) = str_arg(arguments, "disease_id") {
        return Ok(disease_query(id));
    }
    let name = required(arguments, "disease_name")?;
    Ok(RequestParts::post(json!({
        "query": DISEASE_SEARCH_QUERY,
        "variables": { "q": name },
    })))
}

fn disease_from_search(arguments: &Value, search: &Value) -> Result<Option<RequestParts>, SourceError> {
    if str_arg(arguments, "disease_id").is_some() {
        return Ok(None);
    }
    let name = required(arguments, "disease_name")?;
    let efo_id = best_hit(search, &name).ok_or_else(|| not_found("Open Targets disease", &name))?;
    Ok(Some(disease_query(efo_id)))
}

fn disease_analysis() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::DiseaseAnalysis,
        description: "Analyze a disease (associated targets and evidence) using the Open Targets Platform.",
        base_url: "https://api.platform.opentargets.org/api/v4/graphql",
        schema: ArgumentSchema::new()
            .optional("disease_id", FieldKind::String, "EFO or MONDO id, e.g. EFO_0000305")
            .optional("disease_name", FieldKind::String, "Disease name to search for")
            .at_least_one_of(&["disease_id", "disease_name"]),
        build_arguments: disease_arguments,
        request: disease_request,
        prerequisite: None,
        follow_up: Some(FollowUp {
            request: disease_from_search,
            combine: second_payload,
        }),
        graphql: true,
    }
}

// --- Reactome ---

fn pathway_arguments(entities: &[Entity]) -> Value {
    let arguments = json!({ "genes": names(entities, &[EntityType::Gene, EntityType::Protein]) });
    with_optional(arguments, "query", first(entities, &[EntityType::Pathway]))
}

fn pathway_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    if let Some(id) = str_arg(arguments, "pathway_id") {
        return Ok(RequestParts::get(["data", "query", id]));
    }
    let term = str_arg(arguments, "query")
        .map(str::to_string)
        .unwrap_or_else(|| list_arg(arguments, "genes").join(" "));
    if term.is_empty() {
        return Err(SourceError::InvalidArgument(
            "a pathway id, query or gene list is required".to_string(),
        ));
    }
    Ok(RequestParts::get(["search", "query"])
        .param("query", term)
        .param("species", "Homo sapiens")
        .param("types", "Pathway")
        .param("cluster", true))
}

fn pathways() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::Pathways,
        description: "Analyze biological pathways using Reactome.",
        base_url: "https://reactome.org/ContentService",
        schema: ArgumentSchema::new()
            .optional("genes", FieldKind::StringList, "Gene symbols")
            .optional("query", FieldKind::String, "Pathway name or keyword")
            .optional("pathway_id", FieldKind::String, "Reactome stable id, e.g. R-HSA-5685942")
            .at_least_one_of(&["genes", "query", "pathway_id"]),
        build_arguments: pathway_arguments,
        request: pathway_request,
        prerequisite: None,
        follow_up: None,
        graphql: false,
    }
}

// --- ChEMBL ---

const CHEMBL_OPERATIONS: &[&str] = &["molecule_search", "bioactivities", "target"];

fn chembl_arguments(entities: &[Entity]) -> Value {
    if let Some(drug) = first(entities, &[EntityType::Drug, EntityType::Chemical]) {
        return json!({ "operation": "bioactivities", "query": drug });
    }
    with_optional(
        json!({ "operation": "target" }),
        "query",
        first(entities, &[EntityType::Protein, EntityType::Gene]),
    )
}

fn chembl_operation(arguments: &Value) -> &str {
    str_arg(arguments, "operation").unwrap_or_else(|| {
        if str_arg(arguments, "molecule_chembl_id").is_some() {
            "bioactivities"
        } else if str_arg(arguments, "target_chembl_id").is_some() {
            "target"
        } else {
            "molecule_search"
        }
    })
}

fn molecule_search(query: &str, limit: i64) -> RequestParts {
    RequestParts::get(["molecule", "search.json"])
        .param("q", query)
        .param("limit", limit)
}

/// Most potent activities first.
fn activities(filter: &str, chembl_id: &str, limit: i64) -> RequestParts {
    RequestParts::get(["activity.json"])
        .param(filter, chembl_id)
        .param("order_by", "-pchembl_value")
        .param("limit", limit)
}

/// The molecule whose preferred name is `query`, else the first hit.
fn best_molecule<'a>(search: &'a Value, query: &str) -> Option<&'a Value> {
    let molecules = search.get("molecules").and_then(Value::as_array)?;
    molecules
        .iter()
        .find(|m| {
            m.get("pref_name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.eq_ignore_ascii_case(query))
        })
        .or_else(|| molecules.first())
}

fn chembl_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    let limit = int_arg(arguments, "limit", 10);
    match chembl_operation(arguments) {
        "bioactivities" => match str_arg(arguments, "molecule_chembl_id") {
            Some(id) => Ok(activities("molecule_chembl_id", id, int_arg(arguments, "limit", 20))),
            None => Ok(molecule_search(&required(arguments, "query")?, 5)),
        },
        "target" => match str_arg(arguments, "target_chembl_id") {
            Some(id) => Ok(RequestParts::get(["target".to_string(), format!("{id}.json")])),
            None => Ok(RequestParts::get(["target", "search.json"])
                .param("q", required(arguments, "query")?)
                .param("limit", limit)),
        },
        "molecule_search" => Ok(molecule_search(&required(arguments, "query")?, limit)),
        other => Err(SourceError::InvalidArgument(format!(
            "unknown ChEMBL operation '{other}'"
        ))),
    }
}

fn chembl_follow_up(arguments: &Value, first: &Value) -> Result<Option<RequestParts>, SourceError> {
    match chembl_operation(arguments) {
        "bioactivities" if str_arg(arguments, "molecule_chembl_id").is_none() => {
            let query = required(arguments, "query")?;
            let id = best_molecule(first, &query)
                .and_then(|m| m.get("molecule_chembl_id"))
                .and_then(Value::as_str)
                .ok_or_else(|| not_found("ChEMBL molecule", &query))?;
            Ok(Some(activities("molecule_chembl_id", id, int_arg(arguments, "limit", 20))))
        }
        "target" => Ok(str_arg(arguments, "target_chembl_id")
            .map(|id| activities("target_chembl_id", id, 10))),
        _ => Ok(None),
    }
}

fn chembl_combine(arguments: &Value, first: Value, mut second: Value) -> Value {
    let activities = second.get_mut("activities").map(Value::take).unwrap_or_default();
    let page_meta = second.get_mut("page_meta").map(Value::take).unwrap_or_default();
    if chembl_operation(arguments) == "target" {
        return json!({ "target": first, "activities": activities, "page_meta": page_meta });
    }
    let query = str_arg(arguments, "query").unwrap_or_default();
    let molecule = best_molecule(&first, query).map(|m| {
        json!({
            "molecule_chembl_id": m.get("molecule_chembl_id"),
            "pref_name": m.get("pref_name"),
            "max_phase": m.get("max_phase"),
        })
    });
    json!({ "molecule": molecule, "activities": activities, "page_meta": page_meta })
}

fn chembl() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::Chembl,
        description: "Query ChEMBL: search molecules, get a compound's bioactivities (targets and potencies), or look up a drug target.",
        base_url: "https://www.ebi.ac.uk/chembl/api/data",
        schema: ArgumentSchema::new()
            .optional(
                "operation",
                FieldKind::Choice(CHEMBL_OPERATIONS),
                "molecule_search, bioactivities or target",
            )
            .optional("query", FieldKind::String, "Compound, gene or protein name")
            .optional("molecule_chembl_id", FieldKind::String, "ChEMBL molecule id, e.g. CHEMBL941")
            .optional("target_chembl_id", FieldKind::String, "ChEMBL target id, e.g. CHEMBL1824")
            .optional("limit", FieldKind::Integer, "Maximum number of records")
            .at_least_one_of(&["query", "molecule_chembl_id", "target_chembl_id"]),
        build_arguments: chembl_arguments,
        request: chembl_request,
        prerequisite: None,
        follow_up: Some(FollowUp {
            request: chembl_follow_up,
            combine: chembl_combine,
        }),
        graphql: false,
    }
}

// --- PharmGKB ---

const PHARMGKB_OPERATIONS: &[&str] = &["chemical", "clinical_annotations", "variant_annotation"];

fn pharmgkb_arguments(entities: &[Entity]) -> Value {
    let drug = first(entities, &[EntityType::Drug, EntityType::Chemical]);
    let gene = first(entities, &[EntityType::Gene, EntityType::Protein]);
    match (drug, gene) {
        (Some(drug), None) => json!({ "operation": "chemical", "name": drug }),
        (drug, gene) => {
            let arguments = with_optional(json!({ "operation": "clinical_annotations" }), "name", drug);
            with_optional(arguments, "gene", gene)
        }
    }
}

fn pharmgkb_operation(arguments: &Value) -> &str {
    str_arg(arguments, "operation").unwrap_or_else(|| {
        if str_arg(arguments, "variant_annotation_id").is_some() {
            "variant_annotation"
        } else if str_arg(arguments, "gene").is_some() {
            "clinical_annotations"
        } else {
            "chemical"
        }
    })
}

fn pharmgkb_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    match pharmgkb_operation(arguments) {
        "chemical" => Ok(RequestParts::get(["data", "chemical"])
            .param("name", required(arguments, "name")?)
            .param("view", "base")),
        "clinical_annotations" => {
            let gene = str_arg(arguments, "gene");
            let chemical = str_arg(arguments, "name");
            if gene.is_none() && chemical.is_none() {
                return Err(SourceError::InvalidArgument(
                    "clinical annotations need a gene or a chemical name".to_string(),
                ));
            }
            let mut parts = RequestParts::get(["data", "clinicalAnnotation"]);
            if let Some(gene) = gene {
                parts = parts.param("location.genes.symbol", gene);
            }
            if let Some(chemical) = chemical {
                parts = parts.param("relatedChemicals.name", chemical);
            }
            Ok(parts.param("view", "base"))
        }
        "variant_annotation" => {
            let id = required(arguments, "variant_annotation_id")?;
            Ok(RequestParts::get(["data".to_string(), "variantAnnotation".to_string(), id])
                .param("view", "base"))
        }
        other => Err(SourceError::InvalidArgument(format!(
            "unknown PharmGKB operation '{other}'"
        ))),
    }
}

fn pharmgkb() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::PharmGkb,
        description: "Query PharmGKB pharmacogenomics: chemicals by name, clinical annotations for a gene and/or drug, or a variant annotation by id.",
        base_url: "https://api.pharmgkb.org/v1",
        schema: ArgumentSchema::new()
            .optional(
                "operation",
                FieldKind::Choice(PHARMGKB_OPERATIONS),
                "chemical, clinical_annotations or variant_annotation",
            )
            .optional("name", FieldKind::String, "Drug or chemical name")
            .optional("gene", FieldKind::String, "Gene symbol, e.g. CYP2C19")
            .optional("variant_annotation_id", FieldKind::String, "PharmGKB variant annotation id")
            .at_least_one_of(&["name", "gene", "variant_annotation_id"]),
        build_arguments: pharmgkb_arguments,
        request: pharmgkb_request,
        prerequisite: None,
        follow_up: None,
        graphql: false,
    }
}

// --- Ensembl ---

fn variant_arguments(entities: &[Entity]) -> Value {
    let arguments = with_optional(
        json!({}),
        "variant_id",
        first(entities, &[EntityType::Variant]),
    );
    with_optional(arguments, "gene", first(entities, &[EntityType::Gene]))
}

fn variant_request(arguments: &Value) -> Result<RequestParts, SourceError> {
    if let Some(variant) = str_arg(arguments, "variant_id") {
        return Ok(RequestParts::get(["variation", "homo_sapiens", variant])
            .param("content-type", "application/json"));
    }
    let gene = required(arguments, "gene")?;
    Ok(
        RequestParts::get(["lookup".to_string(), "symbol".to_string(), "homo_sapiens".to_string(), gene])
            .param("content-type", "application/json"),
    )
}

fn variants() -> SourceDefinition {
    SourceDefinition {
        id: SourceId::Variants,
        description: "Look up genetic variants (rsIDs) or gene loci using Ensembl.",
        base_url: "https://rest.ensembl.org",
        schema: ArgumentSchema::new()
            .optional("variant_id", FieldKind::String, "dbSNP rsID, e.g. rs429358")
            .optional("gene", FieldKind::String, "Gene symbol")
            .at_least_one_of(&["variant_id", "gene"]),
        build_arguments: variant_arguments,
        request: variant_request,
        prerequisite: None,
        follow_up: None,
        graphql: false,
    }
}

/// Definition of a built-in source.
pub fn definition(source: SourceId) -> SourceDefinition {
    match source {
        SourceId::Literature => literature(),
        SourceId::UniProt => uniprot(),
        SourceId::String => string_db(),
        SourceId::IntAct => intact(),
        SourceId::BioGrid => biogrid(),
        SourceId::Gwas => gwas(),
        SourceId::TargetAnalysis => target_analysis(),
        SourceId::DiseaseAnalysis => disease_analysis(),
        SourceId::Pathways => pathways(),
        SourceId::Chembl => chembl(),
        SourceId::PharmGkb => pharmgkb(),
        SourceId::Variants => variants(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brca1_breast_cancer() -> Vec<Entity> {
        vec![
            Entity::new(EntityType::Gene, "BRCA1"),
            Entity::new(EntityType::Disease, "breast cancer"),
            Entity::new(EntityType::Drug, "olaparib"),
        ]
    }

    #[test]
    fn test_every_source_has_a_definition() {
        for source in SourceId::ALL {
            let definition = definition(source);
            assert_eq!(definition.id, source);
            assert!(!definition.description.is_empty());
        }
    }

    fn param<'a>(parts: &'a RequestParts, key: &str) -> Option<&'a str> {
        parts
            .query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_default_arguments_validate() {
        let entities = brca1_breast_cancer();
        for source in SourceId::ALL {
            let definition = definition(source);
            let arguments = (definition.build_arguments)(&entities);
            assert!(
                definition.schema.validate(&arguments).is_ok(),
                "{source}: {arguments}"
            );
        }
    }

    #[test]
    fn test_literature_term() {
        let arguments = literature_arguments(&brca1_breast_cancer());
        let parts = literature_request(&arguments).unwrap();
        let term = &parts.query.iter().find(|(k, _)| k == "term").unwrap().1;
        assert_eq!(term, "(BRCA1) AND (breast cancer) AND (olaparib)");
    }

    #[test]
    fn test_target_takes_ensembl_id_from_uniprot() {
        let definition = target_analysis();
        let arguments = (definition.build_arguments)(&brca1_breast_cancer());
        assert_eq!(arguments, json!({"gene_symbol": "BRCA1"}));

        let uniprot = json!({"results": [{"uniProtKBCrossReferences": [
            {"database": "PDB", "id": "1JM7"},
            {"database": "Ensembl", "id": "ENST00000357654.9",
             "properties": [{"key": "ProteinId", "value": "ENSP00000350283.3"},
                            {"key": "GeneId", "value": "ENSG00000012048.23"}]}
        ]}]});
        let refined = target_from_uniprot(arguments, &uniprot);
        assert_eq!(refined["target_id"], "ENSG00000012048");
        assert!(definition.schema.validate(&refined).is_ok());

        let parts = target_request(&refined).unwrap();
        assert_eq!(parts.body.unwrap()["variables"]["ensemblId"], "ENSG00000012048");
        assert!(target_from_search(&refined, &json!({})).unwrap().is_none());
    }

    #[test]
    fn test_target_symbol_resolved_through_search() {
        let arguments = json!({"gene_symbol": "APOE"});
        let search = target_request(&arguments).unwrap();
        assert_eq!(search.body.unwrap()["variables"]["q"], "APOE");

        let hits = json!({"search": {"hits": [
            {"id": "ENSG00000234906", "name": "APOC2", "entity": "target"},
            {"id": "ENSG00000130203", "name": "APOE", "entity": "target"}
        ]}});
        let details = target_from_search(&arguments, &hits).unwrap().unwrap();
        assert_eq!(details.body.unwrap()["variables"]["ensemblId"], "ENSG00000130203");

        let err = target_from_search(&arguments, &json!({"search": {"hits": []}})).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("APOE"));
    }

    #[test]
    fn test_disease_name_resolved_through_search() {
        let arguments = json!({"disease_name": "Alzheimer disease"});
        let hits = json!({"search": {"hits": [{"id": "MONDO_0004975", "name": "Alzheimer disease"}]}});
        let details = disease_from_search(&arguments, &hits).unwrap().unwrap();
        assert_eq!(details.body.unwrap()["variables"]["efoId"], "MONDO_0004975");
        assert!(disease_from_search(&json!({"disease_id": "EFO_0000249"}), &hits)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_literature_summaries_follow_search() {
        let arguments = literature_arguments(&brca1_breast_cancer());
        let search = json!({"esearchresult": {"count": "2", "idlist": ["111", "222"]}});
        let parts = literature_summaries(&arguments, &search).unwrap().unwrap();
        assert_eq!(parts.path, vec!["esummary.fcgi"]);
        assert_eq!(param(&parts, "id"), Some("111,222"));

        let summaries = json!({"result": {
            "uids": ["111", "222"],
            "111": {"title": "BRCA1 and PARP inhibition", "fulljournalname": "Nature",
                    "pubdate": "2019 Mar 12", "authors": [{"name": "Doe J"}]},
            "222": {"title": "Olaparib outcomes", "source": "Lancet Oncol", "pubdate": "2021"}
        }});
        let payload = literature_articles(&arguments, search, summaries);
        assert_eq!(payload["count"], "2");
        assert_eq!(payload["articles"][0]["title"], "BRCA1 and PARP inhibition");
        assert_eq!(payload["articles"][0]["journal"], "Nature");
        assert_eq!(payload["articles"][0]["year"], "2019");
        assert_eq!(payload["articles"][1]["journal"], "Lancet Oncol");

        let empty = json!({"esearchresult": {"count": "0", "idlist": []}});
        assert!(literature_summaries(&arguments, &empty).unwrap().is_none());
    }

    #[test]
    fn test_chembl_bioactivities_by_name() {
        let arguments = chembl_arguments(&brca1_breast_cancer());
        assert_eq!(arguments["operation"], "bioactivities");
        let search = chembl_request(&arguments).unwrap();
        assert_eq!(search.path, vec!["molecule", "search.json"]);
        assert_eq!(param(&search, "q"), Some("olaparib"));

        let molecules = json!({"molecules": [
            {"molecule_chembl_id": "CHEMBL9999", "pref_name": "OLAPARIB ANALOG"},
            {"molecule_chembl_id": "CHEMBL521686", "pref_name": "OLAPARIB", "max_phase": 4}
        ]});
        let next = chembl_follow_up(&arguments, &molecules).unwrap().unwrap();
        assert_eq!(next.path, vec!["activity.json"]);
        assert_eq!(param(&next, "molecule_chembl_id"), Some("CHEMBL521686"));

        let activities = json!({"activities": [{"target_pref_name": "PARP 1"}], "page_meta": {"total_count": 1}});
        let payload = chembl_combine(&arguments, molecules, activities);
        assert_eq!(payload["molecule"]["max_phase"], 4);
        assert_eq!(payload["activities"][0]["target_pref_name"], "PARP 1");
    }

    #[test]
    fn test_chembl_direct_ids() {
        let parts = chembl_request(&json!({"molecule_chembl_id": "CHEMBL941"})).unwrap();
        assert_eq!(param(&parts, "molecule_chembl_id"), Some("CHEMBL941"));
        assert!(chembl_follow_up(&json!({"molecule_chembl_id": "CHEMBL941"}), &json!({}))
            .unwrap()
            .is_none());

        let target = json!({"target_chembl_id": "CHEMBL1824"});
        let parts = chembl_request(&target).unwrap();
        assert_eq!(parts.path, vec!["target", "CHEMBL1824.json"]);
        let next = chembl_follow_up(&target, &json!({})).unwrap().unwrap();
        assert_eq!(param(&next, "target_chembl_id"), Some("CHEMBL1824"));
    }

    #[test]
    fn test_pharmgkb_operations() {
        let arguments = pharmgkb_arguments(&brca1_breast_cancer());
        assert_eq!(arguments["operation"], "clinical_annotations");
        let parts = pharmgkb_request(&arguments).unwrap();
        assert_eq!(parts.path, vec!["data", "clinicalAnnotation"]);
        assert_eq!(param(&parts, "location.genes.symbol"), Some("BRCA1"));
        assert_eq!(param(&parts, "relatedChemicals.name"), Some("olaparib"));

        let drug_only = pharmgkb_arguments(&[Entity::new(EntityType::Drug, "clopidogrel")]);
        let parts = pharmgkb_request(&drug_only).unwrap();
        assert_eq!(parts.path, vec!["data", "chemical"]);

        let parts = pharmgkb_request(&json!({"variant_annotation_id": "1451159680"})).unwrap();
        assert_eq!(parts.path, vec!["data", "variantAnnotation", "1451159680"]);

        let err = pharmgkb_request(&json!({"operation": "clinical_annotations"})).unwrap_err();
        assert!(matches!(err, SourceError::InvalidArgument(_)));
    }

    #[test]
    fn test_missing_required_is_invalid_argument() {
        let err = chembl_request(&json!({})).unwrap_err();
        assert!(matches!(err, SourceError::InvalidArgument(_)));
    }

    #[test]
    fn test_gwas_prefers_gene() {
        let parts = gwas_request(&json!({"gene": "APOE", "trait": "alzheimer"})).unwrap();
        assert_eq!(parts.path.last().map(String::as_str), Some("findByGene"));
    }

    #[test]
    fn test_variant_path() {
        let parts = variant_request(&json!({"variant_id": "rs429358"})).unwrap();
        assert_eq!(parts.path, vec!["variation", "homo_sapiens", "rs429358"]);
    }
}
