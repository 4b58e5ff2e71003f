//! Integration tests for the catalog rebuild pipeline

mod cli_run;
mod config_integration;
mod pipeline_end_to_end;
mod test_utils;
