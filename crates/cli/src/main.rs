//! lantern-cli: inspect routing decisions and maintain cache generations.

mod args;
mod commands;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands};
use lantern_client::{FetchConfig, HttpFetcher};
use lantern_core::{AppConfig, CacheDb, LocalRegistration, ServiceWorker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let worker_config = config.worker_config()?;
    tracing::debug!(command = ?cli.command, generation = %worker_config.generation, "running");

    match cli.command {
        Commands::Classify(args) => {
            let (request, class) = commands::classify(&worker_config, &args)?;
            println!("{request} -> {class}");
        }
        Commands::Generations => {
            let storage = CacheDb::open(&config.db_path).await?;
            for row in commands::generations(&storage, &worker_config.generation).await? {
                let marker = if row.current { "*" } else { " " };
                let entries = storage.entry_count(&row.name).await?;
                println!("{marker} {} ({entries} entries)", row.name);
            }
        }
        Commands::Prune => {
            let storage = CacheDb::open(&config.db_path).await?;
            let deleted = commands::prune(&storage, &worker_config.generation).await?;
            if deleted.is_empty() {
                println!("nothing to prune");
            }
            for name in deleted {
                println!("deleted {name}");
            }
        }
        Commands::Warm => {
            let storage = Arc::new(CacheDb::open(&config.db_path).await?);
            let fetcher = Arc::new(HttpFetcher::new(FetchConfig::from(&config))?);
            let worker =
                ServiceWorker::new(worker_config, fetcher, storage, Arc::new(LocalRegistration::default()));
            let (installed, activated) = worker.start().await?;
            println!("installed {} into {}", installed.stored.len(), worker.config().generation);
            for (path, reason) in &installed.failed {
                println!("  skipped {path}: {reason}");
            }
            for name in &activated.deleted {
                println!("deleted {name}");
            }
        }
    }

    Ok(())
}
