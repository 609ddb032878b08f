//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "biochat")]
#[command(about = "BioChat - answers biological questions from public databases", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to biochat.yaml plus biochat.local.yaml)
    #[arg(short, long, global = true, env = "BIOCHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer a single question
    Ask {
        /// The question
        query: String,

        /// Conversation to continue
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Interactive session; every question shares one conversation
    Chat,

    /// Show the extracted intent and entities of a question
    Analyze {
        query: String,
    },

    /// Show the ranked source plan for a question
    Route {
        query: String,

        /// Also run every planned source once and show the outcomes
        #[arg(long)]
        execute: bool,
    },

    /// List the available source tools
    Sources,
}
