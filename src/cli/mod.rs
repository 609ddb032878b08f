//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

use anyhow::Result;
use console::style;

pub use types::{Cli, Commands};

use crate::application::BioChat;
use crate::domain::models::Config;

/// Run a parsed command against a loaded configuration.
pub async fn run(cli: Cli, config: &Config) -> Result<()> {
    let biochat = BioChat::from_config(config)?;
    match cli.command {
        Commands::Ask { query, conversation } => {
            commands::ask::handle_ask(&biochat, &query, conversation, cli.json).await
        }
        Commands::Chat => commands::ask::handle_chat(&biochat, cli.json).await,
        Commands::Analyze { query } => {
            commands::inspect::handle_analyze(&biochat, &query, cli.json).await
        }
        Commands::Route { query, execute } => {
            commands::inspect::handle_route(&biochat, &query, execute, cli.json).await
        }
        Commands::Sources => commands::inspect::handle_sources(&biochat, cli.json),
    }
}

/// Print an error and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json: bool) -> ! {
    if json {
        let body = serde_json::json!({"error": format!("{err:#}")});
        println!("{body}");
    } else {
        eprintln!("{} {err:#}", style("Error:").red().bold());
    }
    std::process::exit(1)
}
