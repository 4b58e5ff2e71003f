//! CLI domain: parse, route and output only.
//! The route table hands off to the rebuild pipeline.

mod output;
mod parse;
mod route;

pub use output::{format_run_output, map_error};
pub use parse::{Cli, Commands};
pub use route::{build_logging_config, CommandOutput, RunContext};
