//! `ask` and `chat`: answer questions through the full pipeline.

use anyhow::{Context, Result};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::application::BioChat;
use crate::cli::output::{create_spinner, ProgressBarExt};
use crate::domain::models::FinalResponse;

fn print_response(response: &FinalResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!("\n{}\n", response.text);
    if !response.citations.is_empty() {
        let sources: Vec<&str> = response.citations.iter().map(|s| s.display_name()).collect();
        println!("{} {}", style("Sources:").bold(), sources.join(", "));
    }
    if response.partial {
        println!(
            "{}",
            style(format!(
                "Partial answer: evidence gathering stopped early ({:?}, {} rounds).",
                response.stop_reason, response.rounds
            ))
            .yellow()
        );
    }
    Ok(())
}

async fn answer(biochat: &BioChat, query: &str, conversation: Option<&str>, json: bool) -> Result<()> {
    let spinner = create_spinner("Consulting biological databases...", json);
    let response = biochat
        .process(query, conversation)
        .await
        .context("Failed to answer question")?;
    if response.partial {
        spinner.finish_warning(format!("Answered after {} rounds", response.rounds));
    } else {
        spinner.finish_success(format!("Answered after {} rounds", response.rounds));
    }
    print_response(&response, json)
}

/// Handle the ask command
pub async fn handle_ask(
    biochat: &BioChat,
    query: &str,
    conversation: Option<String>,
    json: bool,
) -> Result<()> {
    answer(biochat, query, conversation.as_deref(), json).await
}

/// Handle the chat command: read questions from stdin until EOF or `exit`.
pub async fn handle_chat(biochat: &BioChat, json: bool) -> Result<()> {
    let conversation = Uuid::new_v4().to_string();
    if !json {
        println!(
            "{} conversation {} (type 'exit' to quit)",
            style("BioChat").bold().cyan(),
            style(&conversation).dim()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !json {
            eprint!("{} ", style(">").green().bold());
        }
        let Some(line) = lines.next_line().await.context("Failed to read from stdin")? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }
        // A failed question should not end the session.
        if let Err(err) = answer(biochat, query, Some(&conversation), json).await {
            eprintln!("{} {err:#}", style("Error:").red().bold());
        }
    }
    Ok(())
}
