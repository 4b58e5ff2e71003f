//! Paginated Query Engine
//!
//! Materializes a complete collection from a [`CatalogSource`], one page at a time,
//! up to a total item cap. Each page is retried on transient failure; retries never
//! span pages. Hitting the cap is reported through [`Fetched::truncated`].

use crate::attribute::prune_nulls;
use crate::error::{RebuildError, TransportError};
use crate::source::{CatalogSource, Page, PageToken, QueryRequest};
use crate::types::CatalogEntityRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Paging and retry policy for source reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Rows requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Total rows read per query before stopping
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Retries per page after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay between attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Template lookups in flight at once, per table
    #[serde(default = "default_template_concurrency")]
    pub template_concurrency: usize,
}

fn default_page_size() -> usize {
    200
}

fn default_max_items() -> usize {
    10_000
}

fn default_max_retries() -> usize {
    2
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_template_concurrency() -> usize {
    8
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_items: default_max_items(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            template_concurrency: default_template_concurrency(),
        }
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page_size must be positive".to_string());
        }
        if self.max_items == 0 {
            return Err("max_items must be positive".to_string());
        }
        if self.template_concurrency == 0 {
            return Err("template_concurrency must be positive".to_string());
        }
        Ok(())
    }
}

/// A materialized query result.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    pub records: Vec<CatalogEntityRecord>,
    /// The item cap stopped the read while the source still had rows.
    pub truncated: bool,
    pub pages: usize,
}

pub struct PaginatedQuery {
    source: Arc<dyn CatalogSource>,
    config: QueryConfig,
}

impl PaginatedQuery {
    pub fn new(source: Arc<dyn CatalogSource>, config: QueryConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Read every row matching `request`, bounded by the configured cap.
    pub async fn fetch(&self, request: &QueryRequest) -> Result<Fetched, RebuildError> {
        let mut fetched = Fetched::default();
        let mut start_key: Option<PageToken> = None;

        loop {
            let remaining = self.config.max_items - fetched.records.len();
            let limit = self.config.page_size.min(remaining);
            let page = self.fetch_page(request, limit, start_key.as_ref()).await?;
            fetched.pages += 1;

            for item in page.items {
                match CatalogEntityRecord::from_item(request.table, prune_nulls(item)) {
                    Some(record) => fetched.records.push(record),
                    None => warn!(
                        table = %request.table,
                        store_id = %request.key_condition.store_id,
                        "Skipping row without store_id or sort key"
                    ),
                }
            }

            start_key = page.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
            if fetched.records.len() >= self.config.max_items {
                fetched.truncated = true;
                warn!(
                    table = %request.table,
                    index = ?request.index_name,
                    store_id = %request.key_condition.store_id,
                    max_items = self.config.max_items,
                    "Query stopped at item cap; collection is incomplete"
                );
                break;
            }
        }

        debug!(
            table = %request.table,
            index = ?request.index_name,
            store_id = %request.key_condition.store_id,
            records = fetched.records.len(),
            pages = fetched.pages,
            "Query complete"
        );
        Ok(fetched)
    }

    async fn fetch_page(
        &self,
        request: &QueryRequest,
        limit: usize,
        start_key: Option<&PageToken>,
    ) -> Result<Page, RebuildError> {
        let mut retry_count = 0;
        loop {
            match self.source.query_page(request, limit, start_key).await {
                Ok(page) => return Ok(page),
                Err(err) => {
                    if retry_count < self.config.max_retries && err.is_retryable() {
                        retry_count += 1;
                        warn!(
                            table = %request.table,
                            store_id = %request.key_condition.store_id,
                            retry_count,
                            error = %err,
                            "Page read failed; retrying"
                        );
                        sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                        continue;
                    }
                    return Err(query_failed(request, retry_count + 1, err));
                }
            }
        }
    }
}

fn query_failed(request: &QueryRequest, attempts: usize, source: TransportError) -> RebuildError {
    RebuildError::QueryFailed {
        table: request.table,
        attempts,
        source,
    }
}
