//! CLI parse: clap types for catalog-rebuild. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Catalog rebuild CLI - republish a store's catalog to the rule compiler
#[derive(Parser, Debug)]
#[command(name = "catalog-rebuild")]
#[command(about = "Recompute per-store catalog change batches and publish them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides CATALOG_REBUILD_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild one store, or every store an event payload selects
    Run {
        /// Store to rebuild
        #[arg(long, conflicts_with = "event")]
        store_id: Option<String>,

        /// Invocation payload (JSON): stream records or {"store_id": ...}
        #[arg(long)]
        event: Option<PathBuf>,

        /// Catalog fixture (JSON object of table arrays) served as the source
        #[arg(long)]
        fixture: PathBuf,

        /// Keep published batches in memory and print them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}
