//! Integration tests for the `run` command

use crate::integration::test_utils::{insert_record, store_s1_fixture};
use catalog_rebuild::cli::{Cli, Commands, RunContext};
use catalog_rebuild::config::RebuildConfig;
use clap::Parser;
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_json(dir: &TempDir, name: &str, value: &Value) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn dry_run_from_event_file_prints_batches() {
    let temp = TempDir::new().unwrap();
    let fixture = write_json(&temp, "catalog.json", &store_s1_fixture());
    let event = write_json(&temp, "event.json", &json!({"Records": [insert_record("S1")]}));

    let cli = Cli::try_parse_from([
        "catalog-rebuild",
        "run",
        "--event",
        event.to_str().unwrap(),
        "--fixture",
        fixture.to_str().unwrap(),
        "--dry-run",
    ])
    .unwrap();

    let context = RunContext::from_config(RebuildConfig::default());
    let output = context.execute(&cli.command).await.unwrap();
    assert!(output.success);

    let value: Value = serde_json::from_str(&output.text).unwrap();
    let published = value["published"].as_array().unwrap();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0][0]["eventName"], json!("REMOVE"));
    assert_eq!(published[1].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn run_without_target_fails_with_invalid_params() {
    let temp = TempDir::new().unwrap();
    let fixture = write_json(&temp, "catalog.json", &json!({}));

    let context = RunContext::from_config(RebuildConfig::default());
    let output = context
        .execute(&Commands::Run {
            store_id: None,
            event: None,
            fixture,
            dry_run: true,
        })
        .await
        .unwrap();

    assert!(!output.success);
    let value: Value = serde_json::from_str(&output.text).unwrap();
    assert_eq!(value["result"]["comment_id"], json!("invalid_params"));
    assert!(value["published"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_fixture_table_is_a_config_error() {
    let temp = TempDir::new().unwrap();
    let fixture = write_json(&temp, "catalog.json", &json!({"menus": []}));

    let context = RunContext::from_config(RebuildConfig::default());
    let err = context
        .execute(&Commands::Run {
            store_id: Some("S1".to_string()),
            event: None,
            fixture,
            dry_run: true,
        })
        .await
        .unwrap_err();
    assert_eq!(err.comment_id(), "classic_error");
}
