//! Command-line surface for `lantern-cli`.
//!
//! Connection settings (origin, database, cache generation) come from the
//! same `LANTERN_*` configuration the server reads.

use clap::{Parser, Subcommand};

use lantern_core::{Destination, RequestMode};

#[derive(Parser, Debug)]
#[command(name = "lantern-cli", version, about = "Inspect and maintain the lantern offline cache", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show which routing class a request falls into
    Classify(ClassifyArgs),
    /// List cache generations, marking the current one
    Generations,
    /// Delete every generation except the current one
    Prune,
    /// Run install and activate against the origin
    Warm,
}

#[derive(Parser, Debug)]
pub struct ClassifyArgs {
    /// Absolute URL, or a path resolved against the configured origin
    pub url: String,

    /// Request mode (navigate, same-origin, no-cors, cors)
    #[arg(long, default_value = "no-cors")]
    pub mode: RequestMode,

    /// Request destination (document, image, script, ...)
    #[arg(long = "dest", default_value = "empty")]
    pub destination: Destination,

    #[arg(long, default_value = "GET")]
    pub method: String,
}
