//! Catalog Source Abstraction
//!
//! Boundary to the wide-column store holding the catalog tables. Every table is
//! partitioned by `store_id`; options and choices carry a secondary index used for
//! template prefix lookups. Implementations return one page per call and a
//! continuation key; paging and retrying belong to [`crate::query`].

use crate::error::TransportError;
use crate::types::{Attributes, CatalogTable};
use async_trait::async_trait;

mod memory;

pub use memory::MemorySource;

/// `begins_with(attribute, prefix)` on the sort key of the queried index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixCondition {
    pub attribute: String,
    pub prefix: String,
}

/// `store_id = :store_id [AND begins_with(...)]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCondition {
    pub store_id: String,
    pub begins_with: Option<PrefixCondition>,
}

/// One logical query; the engine pages through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub table: CatalogTable,
    pub index_name: Option<String>,
    pub key_condition: KeyCondition,
    /// Attributes to return. Empty means all.
    pub projection: Vec<String>,
}

impl QueryRequest {
    /// Every row of `table` for one store, projected to its key attributes.
    pub fn store_partition(table: CatalogTable, store_id: &str) -> Self {
        Self {
            table,
            index_name: None,
            key_condition: KeyCondition {
                store_id: store_id.to_string(),
                begins_with: None,
            },
            projection: vec!["store_id".to_string(), table.sort_key().to_string()],
        }
    }

    /// Rows derived from a template, found through the table's template index.
    /// `None` for tables without one.
    pub fn template_lookup(table: CatalogTable, store_id: &str, prefix: &str) -> Option<Self> {
        let index = table.template_index()?;
        Some(Self {
            table,
            index_name: Some(index.index_name.to_string()),
            key_condition: KeyCondition {
                store_id: store_id.to_string(),
                begins_with: Some(PrefixCondition {
                    attribute: index.attribute.to_string(),
                    prefix: prefix.to_string(),
                }),
            },
            projection: vec![table.sort_key().to_string(), "store_id".to_string()],
        })
    }
}

/// Continuation key returned by the source (the key attributes of the last row read).
pub type PageToken = Attributes;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Attributes>,
    pub last_evaluated_key: Option<PageToken>,
}

/// Catalog store client trait
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Read at most `limit` rows, resuming after `start_key` when given.
    async fn query_page(
        &self,
        request: &QueryRequest,
        limit: usize,
        start_key: Option<&PageToken>,
    ) -> Result<Page, TransportError>;
}
