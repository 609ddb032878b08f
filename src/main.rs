//! BioChat CLI entry point.

use clap::Parser;

use biochat::cli::{handle_error, Cli};
use biochat::infrastructure::config::ConfigLoader;
use biochat::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match cli.config.as_deref() {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => handle_error(&err, json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(&err, json),
    };

    if let Err(err) = biochat::cli::run(cli, &config).await {
        handle_error(&err, json);
    }
}
