//! Command implementations, separated from printing so they can be tested
//! against in-memory storage.

use anyhow::{Context, Result};

use lantern_client::fetch::resolve;
use lantern_core::{CacheGeneration, CacheStorage, Request, RoutingClass, WorkerConfig};

use crate::args::ClassifyArgs;

/// A stored generation and whether it is the one the worker serves from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRow {
    pub name: String,
    pub current: bool,
}

pub fn classify(config: &WorkerConfig, args: &ClassifyArgs) -> Result<(Request, RoutingClass)> {
    let url = resolve(&config.origin, &args.url).with_context(|| format!("cannot classify {}", args.url))?;
    let request = Request::new(&args.method, url)
        .with_mode(args.mode)
        .with_destination(args.destination);
    let class = config.rules.classify(&request, &config.origin.origin());
    Ok((request, class))
}

pub async fn generations(storage: &dyn CacheStorage, current: &CacheGeneration) -> Result<Vec<GenerationRow>> {
    let names = storage.keys().await.context("failed to list cache generations")?;
    Ok(names
        .into_iter()
        .map(|name| GenerationRow { current: name == current.as_str(), name })
        .collect())
}

/// Delete stale generations, returning the names removed.
pub async fn prune(storage: &dyn CacheStorage, current: &CacheGeneration) -> Result<Vec<String>> {
    current.prune(storage).await.context("failed to prune cache generations")
}
