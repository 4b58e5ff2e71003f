//! Template expansion.
//!
//! A template row (`all_<key>`) stands for every concrete row indexed under
//! `<key>_` on the table's template index. Lookups for one table run concurrently,
//! at most `template_concurrency` at a time, and are folded back in template order.
//! Derived rows go through the prefix rules again, so a derived test row or nested
//! template never reaches the batch.

use crate::error::RebuildError;
use crate::query::PaginatedQuery;
use crate::rules::{retain_live, TemplateRow};
use crate::source::QueryRequest;
use crate::types::{CatalogEntityRecord, CatalogTable};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, warn};

/// Expansion output for one table.
#[derive(Debug, Clone, Default)]
pub struct Expanded {
    pub records: Vec<CatalogEntityRecord>,
    /// Some lookup hit the item cap.
    pub truncated: bool,
}

pub struct TemplateExpander<'a> {
    query: &'a PaginatedQuery,
}

impl<'a> TemplateExpander<'a> {
    pub fn new(query: &'a PaginatedQuery) -> Self {
        Self { query }
    }

    /// Resolve every template of one table. Any failed lookup fails the whole expansion.
    pub async fn expand(
        &self,
        table: CatalogTable,
        templates: &[TemplateRow],
    ) -> Result<Expanded, RebuildError> {
        if templates.is_empty() {
            return Ok(Expanded::default());
        }
        let lookups = templates.iter().filter_map(|template| {
            let prefix = format!("{}_", template.template_key);
            let request =
                QueryRequest::template_lookup(table, &template.record.store_id, &prefix);
            if request.is_none() {
                warn!(table = %table, entity_id = %template.record.entity_id, "Table has no template index");
            }
            request
        });

        let limit = self.query.config().template_concurrency.max(1);
        let results: Vec<_> = stream::iter(lookups)
            .map(|request| async move {
                let fetched = self.query.fetch(&request).await?;
                debug!(
                    table = %table,
                    prefix = ?request.key_condition.begins_with.as_ref().map(|c| c.prefix.as_str()),
                    records = fetched.records.len(),
                    "Template expanded"
                );
                Ok::<_, RebuildError>(fetched)
            })
            .buffered(limit)
            .try_collect()
            .await?;

        let mut expanded = Expanded::default();
        for fetched in results {
            expanded.truncated |= fetched.truncated;
            expanded.records.extend(retain_live(fetched.records));
        }
        Ok(expanded)
    }
}
