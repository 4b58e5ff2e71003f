//! End-to-end rebuilds through the pipeline with in-memory transports

use crate::integration::test_utils::{
    insert_record, schedule_modify_record, store_s1_fixture, two_store_fixture, FailingSource,
    IndexOnlySource, RecordingChat,
};
use catalog_rebuild::clock::FixedClock;
use catalog_rebuild::config::RebuildConfig;
use catalog_rebuild::dispatch::MemoryQueue;
use catalog_rebuild::pipeline::RebuildPipeline;
use catalog_rebuild::source::MemorySource;
use catalog_rebuild::types::{CatalogTable, StoreRef};
use serde_json::{json, Value};
use std::sync::Arc;

fn messages(queue: &MemoryQueue) -> Vec<Value> {
    queue.published().into_iter().flatten().collect()
}

#[tokio::test]
async fn direct_request_rebuilds_store_and_notifies_once() {
    let config = RebuildConfig::default();
    let source = Arc::new(MemorySource::from_fixture(&store_s1_fixture()).unwrap());
    let queue = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::new());
    let pipeline = RebuildPipeline::new(source.clone(), queue.clone(), &config)
        .with_chat(chat.clone(), &config)
        .with_clock(Arc::new(FixedClock(1_700_000_000.5)));

    let result = pipeline.handle(&json!({"store_id": "S1"})).await;
    assert!(result.success, "unexpected failure: {:?}", result);
    assert!(result.comment_id.is_none());

    // Marker alone first, then one chunk with the rebuild.
    let published = queue.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].len(), 1);
    assert_eq!(
        published[0][0],
        json!({
            "store_id": "S1",
            "eventName": "REMOVE",
            "ApproximateCreationDateTime": 1_700_000_000.5
        })
    );

    let rebuild = &published[1];
    assert_eq!(rebuild.len(), 6);
    let keys: Vec<(String, String)> = rebuild
        .iter()
        .map(|m| {
            let table = m["table"].as_str().unwrap().to_string();
            let sort_key = CatalogTable::from_name(&table).unwrap().sort_key();
            (table, m[sort_key].as_str().unwrap().to_string())
        })
        .collect();
    assert_eq!(
        keys,
        vec![
            ("categories".to_string(), "c1".to_string()),
            ("categories".to_string(), "c2".to_string()),
            ("products_new".to_string(), "p1".to_string()),
            ("products_new".to_string(), "p2".to_string()),
            ("options".to_string(), "p1_size".to_string()),
            ("options".to_string(), "p2_size".to_string()),
        ]
    );
    assert!(rebuild.iter().all(|m| m["eventName"] == json!("MODIFY")));
    assert!(rebuild.iter().all(|m| m["store_id"] == json!("S1")));

    // Four partition reads plus the `all_size` index lookup.
    assert_eq!(source.page_requests(), 5);

    let sent = chat.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, config.notify.channel);
    assert!(sent[0].1.contains("store_id: S1"));
}

#[tokio::test]
async fn derived_options_reach_the_batch_through_the_template_index() {
    let config = RebuildConfig::default();
    let memory = MemorySource::from_fixture(&store_s1_fixture()).unwrap();
    let source = Arc::new(IndexOnlySource::new(memory, CatalogTable::Options));
    let queue = Arc::new(MemoryQueue::new());
    let pipeline = RebuildPipeline::new(source.clone(), queue.clone(), &config);

    let built = pipeline.build_batch(&StoreRef::new("S1")).await.unwrap();
    let options: Vec<&str> = built
        .batch
        .rebuild()
        .iter()
        .filter(|m| m.table == Some(CatalogTable::Options))
        .filter_map(|m| m.entity_id.as_deref())
        .collect();
    assert_eq!(options, vec!["p1_size", "p2_size"]);
    assert_eq!(built.batch.rebuild_count(CatalogTable::Options), 2);
    assert_eq!(
        source.index_lookups(),
        vec!["store_id-template_id_option_id-index".to_string()]
    );
}

#[tokio::test]
async fn failed_store_aborts_after_earlier_stores_were_dispatched() {
    let config = RebuildConfig::default();
    let memory = MemorySource::from_fixture(&two_store_fixture()).unwrap();
    let source = Arc::new(FailingSource::new(memory, "S2", CatalogTable::Choices));
    let queue = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::new());
    let pipeline = RebuildPipeline::new(source.clone(), queue.clone(), &config)
        .with_chat(chat.clone(), &config);

    let payload = json!({"Records": [insert_record("S1"), insert_record("S2")]});
    let result = pipeline.handle(&payload).await;

    assert!(!result.success);
    assert_eq!(result.comment_id.as_deref(), Some("query_failed"));
    assert!(result.comments.unwrap().contains("choices"));
    // Rejections are not retried.
    assert_eq!(source.failures(), 1);

    let published = messages(&queue);
    assert!(!published.is_empty());
    assert!(published.iter().all(|m| m["store_id"] == json!("S1")));
    assert_eq!(chat.sent().len(), 1);
}

#[tokio::test]
async fn unchanged_schedule_rebuilds_nothing() {
    let config = RebuildConfig::default();
    let source = Arc::new(MemorySource::from_fixture(&store_s1_fixture()).unwrap());
    let queue = Arc::new(MemoryQueue::new());
    let pipeline = RebuildPipeline::new(source, queue.clone(), &config);

    let payload = json!({"Records": [schedule_modify_record("S1", "9-17", "9-17")]});
    let result = pipeline.handle(&payload).await;

    assert!(result.success);
    assert!(queue.bodies().is_empty());
}

#[tokio::test]
async fn schedule_change_rebuilds_the_store() {
    let config = RebuildConfig::default();
    let source = Arc::new(MemorySource::from_fixture(&store_s1_fixture()).unwrap());
    let queue = Arc::new(MemoryQueue::new());
    let pipeline = RebuildPipeline::new(source, queue.clone(), &config);

    let payload = json!({"Records": [schedule_modify_record("S1", "9-17", "10-18")]});
    let summary = pipeline
        .run(&catalog_rebuild::trigger::Trigger::from_payload(&payload).unwrap())
        .await
        .unwrap();

    assert_eq!(summary.stores.len(), 1);
    assert_eq!(summary.stores[0].store_id, "S1");
    assert_eq!(summary.stores[0].messages, 6);
    assert_eq!(summary.stores[0].chunks, 1);
    assert!(!summary.stores[0].notified);
    assert_eq!(messages(&queue).len(), 7);
}

#[tokio::test]
async fn stream_record_without_store_id_is_invalid() {
    let config = RebuildConfig::default();
    let source = Arc::new(MemorySource::new());
    let queue = Arc::new(MemoryQueue::new());
    let pipeline = RebuildPipeline::new(source, queue.clone(), &config);

    let payload = json!({
        "Records": [{"eventName": "INSERT", "dynamodb": {"NewImage": {"name": {"S": "nameless"}}}}]
    });
    let result = pipeline.handle(&payload).await;

    assert!(!result.success);
    assert_eq!(result.comment_id.as_deref(), Some("invalid_params"));
    assert!(queue.bodies().is_empty());
}

#[tokio::test]
async fn large_store_is_chunked_by_dispatch_size() {
    let config = RebuildConfig::default();
    let source = MemorySource::new();
    for i in 0..250 {
        let mut row = serde_json::Map::new();
        row.insert("store_id".into(), json!("S7"));
        row.insert("product_id".into(), json!(format!("p{:03}", i)));
        source.insert(CatalogTable::ProductsNew, row);
    }
    let queue = Arc::new(MemoryQueue::new());
    let pipeline = RebuildPipeline::new(Arc::new(source), queue.clone(), &config);

    let result = pipeline.handle(&json!({"store_id": "S7"})).await;
    assert!(result.success);

    let sizes: Vec<usize> = queue.published().iter().map(Vec::len).collect();
    assert_eq!(sizes[0], 1);
    let mut chunk_sizes = sizes[1..].to_vec();
    chunk_sizes.sort_unstable();
    assert_eq!(chunk_sizes, vec![50, 100, 100]);
}
