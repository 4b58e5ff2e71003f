//! Integration tests for Configuration System

use catalog_rebuild::assemble::{assemble, StoreCatalog};
use catalog_rebuild::clock::FixedClock;
use catalog_rebuild::config::{ConfigLoader, RebuildConfig};
use catalog_rebuild::dispatch::{MemoryQueue, QueueDispatcher};
use catalog_rebuild::error::RebuildError;
use catalog_rebuild::types::{CatalogEntityRecord, CatalogTable};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// Serializes access to process environment across tests in this binary.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

#[test]
fn test_environment_overrides_file_values() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("rebuild.toml");
    std::fs::write(
        &config_file,
        r#"
[query]
page_size = 50
max_items = 500
"#,
    )
    .unwrap();

    std::env::set_var("CATALOG_REBUILD__QUERY__PAGE_SIZE", "25");
    let loaded = ConfigLoader::load(Some(&config_file));
    std::env::remove_var("CATALOG_REBUILD__QUERY__PAGE_SIZE");

    let config = loaded.unwrap();
    assert_eq!(config.query.page_size, 25);
    assert_eq!(config.query.max_items, 500);
}

#[test]
fn test_load_without_file_uses_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let config = ConfigLoader::load(None).unwrap();
    assert_eq!(config, RebuildConfig::default());
}

#[test]
fn test_missing_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");
    assert!(ConfigLoader::load_from_file(&missing).is_err());
}

#[test]
fn test_invalid_queue_url_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("rebuild.toml");
    std::fs::write(&config_file, "[dispatch]\nqueue_url = \"queue.local/catalog\"\n").unwrap();

    let err = ConfigLoader::load_from_file(&config_file).unwrap_err();
    assert!(err.to_string().contains("queue_url"));
}

#[test]
fn test_publish_size_above_queue_limit_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("rebuild.toml");
    std::fs::write(&config_file, "[dispatch]\nchunk_size = 250\n").unwrap();

    let err = ConfigLoader::load_from_file(&config_file).unwrap_err();
    assert!(matches!(err, RebuildError::ConfigError(_)));
    assert!(err.to_string().contains("chunk_size must be between 1 and 100"));
}

#[tokio::test]
async fn test_loaded_dispatch_config_drives_dispatcher() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("rebuild.toml");
    std::fs::write(&config_file, "[dispatch]\nchunk_size = 10\nmax_retries = 0\n").unwrap();
    let config = ConfigLoader::load_from_file(&config_file).unwrap();

    let products = (0..25)
        .map(|i| CatalogEntityRecord {
            store_id: "S1".to_string(),
            entity_id: format!("p{:02}", i),
            table: CatalogTable::ProductsNew,
            attributes: Default::default(),
        })
        .collect();
    let catalog = StoreCatalog {
        products,
        ..StoreCatalog::default()
    };
    let batch = assemble("S1", catalog, &FixedClock(1.0));

    let queue = Arc::new(MemoryQueue::new());
    let report = QueueDispatcher::new(queue.clone(), config.dispatch)
        .dispatch(&batch)
        .await
        .unwrap();
    assert_eq!(report.chunks, 3);
    assert_eq!(report.messages, 25);
    assert_eq!(queue.bodies().len(), 4);
}
