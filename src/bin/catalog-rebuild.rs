//! Catalog Rebuild CLI Binary
//!
//! Command-line entry point for rebuilding store catalogs.

use anyhow::Context;
use catalog_rebuild::cli::{build_logging_config, map_error, Cli, RunContext};
use catalog_rebuild::logging::init_logging;
use clap::Parser;
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let context = RunContext::new(cli.config.clone());

    // Logging comes up even when the config is broken so the failure is reported.
    let logging_config = build_logging_config(&cli, context.as_ref().ok().map(|c| c.config()));
    init_logging(Some(&logging_config)).context("Failed to initialize logging")?;

    let context = match context {
        Ok(context) => context,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            anyhow::bail!(map_error(&e));
        }
    };
    info!("Catalog rebuild CLI starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match runtime.block_on(context.execute(&cli.command)) {
        Ok(output) => {
            println!("{}", output.text);
            if output.success {
                info!("Command completed successfully");
            }
            Ok(output.success)
        }
        Err(e) => {
            error!("Command failed: {}", e);
            anyhow::bail!(map_error(&e))
        }
    }
}
