//! In-memory catalog source backed by a JSON fixture.
//!
//! Fixture shape: `{"categories": [{...}, ...], "products_new": [...], ...}`. Rows are
//! returned sorted by the queried key, with the key attributes of the last row as the
//! continuation token, the way the real store pages.

use super::{CatalogSource, Page, PageToken, QueryRequest};
use crate::error::{RebuildError, TransportError};
use crate::types::{Attributes, CatalogTable};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

#[derive(Default)]
pub struct MemorySource {
    tables: RwLock<HashMap<CatalogTable, Vec<Attributes>>>,
    page_requests: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: &Value) -> Result<Self, RebuildError> {
        let tables = fixture.as_object().ok_or_else(|| {
            RebuildError::ConfigError("fixture must be an object of table arrays".to_string())
        })?;
        let source = Self::new();
        for (name, rows) in tables {
            let table = CatalogTable::from_name(name).ok_or_else(|| {
                RebuildError::ConfigError(format!("fixture names unknown table '{}'", name))
            })?;
            let rows = rows.as_array().ok_or_else(|| {
                RebuildError::ConfigError(format!("fixture table '{}' is not an array", name))
            })?;
            for row in rows {
                let row = row.as_object().cloned().ok_or_else(|| {
                    RebuildError::ConfigError(format!("fixture row in '{}' is not an object", name))
                })?;
                source.insert(table, row);
            }
        }
        Ok(source)
    }

    pub fn from_fixture_file(path: &Path) -> Result<Self, RebuildError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RebuildError::ConfigError(format!("Failed to read fixture {:?}: {}", path, e))
        })?;
        let fixture: Value = serde_json::from_str(&raw)?;
        Self::from_fixture(&fixture)
    }

    pub fn insert(&self, table: CatalogTable, row: Attributes) {
        self.tables.write().entry(table).or_default().push(row);
    }

    /// Number of `query_page` calls served so far.
    pub fn page_requests(&self) -> usize {
        self.page_requests.load(AtomicOrdering::SeqCst)
    }

    /// Sort key of a row for this request: (index attribute, table sort key).
    fn row_key(request: &QueryRequest, row: &Attributes) -> (String, String) {
        let index_value = request
            .key_condition
            .begins_with
            .as_ref()
            .and_then(|condition| row.get(&condition.attribute))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let sort_value = row
            .get(request.table.sort_key())
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        (index_value, sort_value)
    }

    fn matches(request: &QueryRequest, row: &Attributes) -> bool {
        let condition = &request.key_condition;
        if row.get("store_id").and_then(Value::as_str) != Some(condition.store_id.as_str()) {
            return false;
        }
        match &condition.begins_with {
            Some(prefix) => row
                .get(&prefix.attribute)
                .and_then(Value::as_str)
                .map(|value| value.starts_with(&prefix.prefix))
                .unwrap_or(false),
            None => true,
        }
    }

    fn token_for(request: &QueryRequest, row: &Attributes) -> PageToken {
        let mut token = PageToken::new();
        let mut keys = vec!["store_id", request.table.sort_key()];
        if let Some(condition) = &request.key_condition.begins_with {
            keys.push(condition.attribute.as_str());
        }
        for key in keys {
            if let Some(value) = row.get(key) {
                token.insert(key.to_string(), value.clone());
            }
        }
        token
    }

    fn project(request: &QueryRequest, row: &Attributes) -> Attributes {
        if request.projection.is_empty() {
            return row.clone();
        }
        row.iter()
            .filter(|(key, _)| request.projection.iter().any(|p| p == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[async_trait]
impl CatalogSource for MemorySource {
    async fn query_page(
        &self,
        request: &QueryRequest,
        limit: usize,
        start_key: Option<&PageToken>,
    ) -> Result<Page, TransportError> {
        self.page_requests.fetch_add(1, AtomicOrdering::SeqCst);
        if limit == 0 {
            return Err(TransportError::Rejected("limit must be positive".to_string()));
        }

        let tables = self.tables.read();
        let mut rows: Vec<&Attributes> = tables
            .get(&request.table)
            .map(|rows| rows.iter().filter(|row| Self::matches(request, row)).collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| Self::row_key(request, a).cmp(&Self::row_key(request, b)));

        let resume_after = start_key.map(|token| Self::row_key(request, token));
        let mut remaining = rows.into_iter().filter(|row| match &resume_after {
            Some(after) => Self::row_key(request, row).cmp(after) == Ordering::Greater,
            None => true,
        });

        let page: Vec<&Attributes> = remaining.by_ref().take(limit).collect();
        let more = remaining.next().is_some();
        let last_evaluated_key = match (more, page.last()) {
            (true, Some(last)) => Some(Self::token_for(request, last)),
            _ => None,
        };

        Ok(Page {
            items: page.into_iter().map(|row| Self::project(request, row)).collect(),
            last_evaluated_key,
        })
    }
}
