//! `analyze`, `route` and `sources`: inspect individual pipeline stages.

use anyhow::Result;
use serde_json::json;

use crate::application::BioChat;
use crate::cli::output::{create_spinner, ProgressBarExt, TableFormatter};

/// Handle the analyze command
pub async fn handle_analyze(biochat: &BioChat, query: &str, json: bool) -> Result<()> {
    let analysis = biochat.analyze(query).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!("Intent:       {}", analysis.intent);
    println!(
        "Relationship: {}",
        analysis.relationship.map_or("none", |r| r.as_str())
    );
    println!(
        "Confidence:   {:.2}{}",
        analysis.confidence,
        if analysis.is_fallback() { " (keyword fallback)" } else { "" }
    );
    if analysis.entities.is_empty() {
        println!("\nNo entities found.");
    } else {
        println!("\n{}", TableFormatter::new().format_analysis(&analysis));
    }
    Ok(())
}

/// Handle the route command
pub async fn handle_route(biochat: &BioChat, query: &str, execute: bool, json: bool) -> Result<()> {
    let analysis = biochat.analyze(query).await;
    let plan = biochat.route(&analysis);

    let results = if execute {
        let spinner = create_spinner(format!("Querying {} sources...", plan.len()), json);
        let results = biochat.execute(&plan, &analysis.entities).await;
        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        spinner.finish_success(format!("{succeeded}/{} sources answered", results.len()));
        Some(results)
    } else {
        None
    };

    if json {
        let output = json!({
            "analysis": analysis,
            "plan": plan,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let formatter = TableFormatter::new();
    println!("{}", formatter.format_plan(&plan));
    if let Some(results) = results {
        println!("\n{}", formatter.format_results(&results));
    }
    Ok(())
}

/// Handle the sources command
pub fn handle_sources(biochat: &BioChat, json: bool) -> Result<()> {
    let tools = biochat.registry().tool_schemas();
    if json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
    } else {
        println!("{}", TableFormatter::new().format_tools(&tools));
        println!("\n{} sources available", tools.len());
    }
    Ok(())
}
