//! Shared test utilities for integration tests
//!
//! Fakes for the injected transports and the catalog fixtures the pipeline tests share.

use async_trait::async_trait;
use catalog_rebuild::error::TransportError;
use catalog_rebuild::notify::ChatNotifier;
use catalog_rebuild::source::{CatalogSource, MemorySource, Page, PageToken, QueryRequest};
use catalog_rebuild::types::CatalogTable;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serves a [`MemorySource`] but rejects every read of one table for one store.
pub struct FailingSource {
    inner: MemorySource,
    store_id: String,
    table: CatalogTable,
    failures: AtomicUsize,
}

impl FailingSource {
    pub fn new(inner: MemorySource, store_id: &str, table: CatalogTable) -> Self {
        Self {
            inner,
            store_id: store_id.to_string(),
            table,
            failures: AtomicUsize::new(0),
        }
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for FailingSource {
    async fn query_page(
        &self,
        request: &QueryRequest,
        limit: usize,
        start_key: Option<&PageToken>,
    ) -> Result<Page, TransportError> {
        if request.table == self.table && request.key_condition.store_id == self.store_id {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(TransportError::Rejected(format!(
                "access denied on {}",
                request.table
            )));
        }
        self.inner.query_page(request, limit, start_key).await
    }
}

/// Serves a [`MemorySource`] but hides a table's template-derived rows from plain
/// partition reads, so they can only arrive through the template index.
pub struct IndexOnlySource {
    inner: MemorySource,
    table: CatalogTable,
    index_lookups: Mutex<Vec<String>>,
}

impl IndexOnlySource {
    pub fn new(inner: MemorySource, table: CatalogTable) -> Self {
        Self {
            inner,
            table,
            index_lookups: Mutex::new(Vec::new()),
        }
    }

    /// Index names queried so far, in call order.
    pub fn index_lookups(&self) -> Vec<String> {
        self.index_lookups.lock().clone()
    }
}

#[async_trait]
impl CatalogSource for IndexOnlySource {
    async fn query_page(
        &self,
        request: &QueryRequest,
        limit: usize,
        start_key: Option<&PageToken>,
    ) -> Result<Page, TransportError> {
        if let Some(index_name) = &request.index_name {
            self.index_lookups.lock().push(index_name.clone());
            return self.inner.query_page(request, limit, start_key).await;
        }
        let index = match self.table.template_index() {
            Some(index) if request.table == self.table => index,
            _ => return self.inner.query_page(request, limit, start_key).await,
        };
        let mut page = self
            .inner
            .query_page(&unprojected(request), limit, start_key)
            .await?;
        page.items.retain(|row| !row.contains_key(index.attribute));
        for row in &mut page.items {
            row.retain(|key, _| request.projection.contains(key));
        }
        Ok(page)
    }
}

fn unprojected(request: &QueryRequest) -> QueryRequest {
    QueryRequest {
        projection: Vec::new(),
        ..request.clone()
    }
}

/// Chat client that records what it was asked to post.
#[derive(Default)]
pub struct RecordingChat {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChatNotifier for RecordingChat {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        self.sent.lock().push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

/// Store S1: two categories, three products (one reserved), an `all_size`
/// option template with two derived options, no choices.
pub fn store_s1_fixture() -> Value {
    json!({
        "categories": [
            {"store_id": "S1", "category_id": "c1", "name": "Drinks"},
            {"store_id": "S1", "category_id": "c2", "name": "Food"}
        ],
        "products_new": [
            {"store_id": "S1", "product_id": "p1"},
            {"store_id": "S1", "product_id": "p2"},
            {"store_id": "S1", "product_id": "test_x"}
        ],
        "options": [
            {"store_id": "S1", "product_id_option_id": "all_size"},
            {"store_id": "S1", "product_id_option_id": "p1_size", "template_id_option_id": "size_p1"},
            {"store_id": "S1", "product_id_option_id": "p2_size", "template_id_option_id": "size_p2"}
        ]
    })
}

/// Two stores: S1 as above plus S2 with a category, a product and a choice.
pub fn two_store_fixture() -> Value {
    let mut fixture = store_s1_fixture();
    let tables = fixture.as_object_mut().expect("fixture is an object");
    push_row(tables, "categories", json!({"store_id": "S2", "category_id": "c9"}));
    push_row(tables, "products_new", json!({"store_id": "S2", "product_id": "p9"}));
    tables.insert(
        "choices".to_string(),
        json!([{"store_id": "S2", "option_id_choice_id": "o9_small"}]),
    );
    fixture
}

fn push_row(tables: &mut serde_json::Map<String, Value>, table: &str, row: Value) {
    if let Some(rows) = tables.get_mut(table).and_then(Value::as_array_mut) {
        rows.push(row);
    }
}

/// A change-stream INSERT of a store account.
pub fn insert_record(store_id: &str) -> Value {
    json!({
        "eventName": "INSERT",
        "dynamodb": {
            "NewImage": {
                "store_id": {"S": store_id},
                "schedule": {"M": {"mon": {"S": "09:00-17:00"}}}
            }
        }
    })
}

/// A change-stream MODIFY of a store account's `schedule`.
pub fn schedule_modify_record(store_id: &str, old: &str, new: &str) -> Value {
    json!({
        "eventName": "MODIFY",
        "dynamodb": {
            "OldImage": {
                "store_id": {"S": store_id},
                "schedule": {"S": old},
                "pickupSchedule": {"NULL": true}
            },
            "NewImage": {
                "store_id": {"S": store_id},
                "schedule": {"S": new},
                "pickupSchedule": {"NULL": true}
            }
        }
    })
}
