use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use comicrag::cli::{Cli, Commands};
use comicrag::config::Config;
use comicrag::logging::{init_early_logging, init_logging};
use comicrag::metrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let config = match Config::load(&project_root) {
        Ok(config) => config,
        Err(e) => {
            init_early_logging();
            tracing::error!("Failed to load configuration: {:#}", e);
            return Err(e);
        }
    };

    // Held until exit so buffered log lines get flushed
    let _logging_guard = init_logging(&config.logging, &project_root)?;

    tracing::info!("comicrag starting up");
    tracing::debug!("Loaded configuration from: {}", project_root.display());

    metrics::register_metrics();

    match cli.command {
        Commands::Init { force } => {
            comicrag::commands::init::run(force).await?;
        }
        Commands::Serve { port, reconcile } => {
            comicrag::commands::serve::run(port, reconcile).await?;
        }
        Commands::Submit {
            archives,
            name,
            reconcile,
        } => {
            comicrag::commands::submit::run(archives, name, reconcile).await?;
        }
        Commands::Search { query, limit } => {
            comicrag::commands::search::run(&query, limit).await?;
        }
        Commands::Check { reconcile } => {
            comicrag::commands::check::run(reconcile).await?;
        }
    }

    Ok(())
}
