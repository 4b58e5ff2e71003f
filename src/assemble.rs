//! Message assembly: one ordered, deduplicated change batch per store.

use crate::clock::Clock;
use crate::rules::{classify, EntityClass};
use crate::types::{CatalogEntityRecord, CatalogTable, ChangeBatch, ChangeMessage};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Filtered and expanded rows of one store, per table.
#[derive(Debug, Clone, Default)]
pub struct StoreCatalog {
    pub categories: Vec<CatalogEntityRecord>,
    pub products: Vec<CatalogEntityRecord>,
    pub options: Vec<CatalogEntityRecord>,
    pub expanded_options: Vec<CatalogEntityRecord>,
    pub choices: Vec<CatalogEntityRecord>,
    pub expanded_choices: Vec<CatalogEntityRecord>,
}

impl StoreCatalog {
    /// Sections in fold order: categories, products, options, choices; simple rows
    /// before expanded ones.
    fn into_sections(self) -> [Vec<CatalogEntityRecord>; 6] {
        [
            self.categories,
            self.products,
            self.options,
            self.expanded_options,
            self.choices,
            self.expanded_choices,
        ]
    }
}

/// Builds a [`ChangeBatch`]: REMOVE-all marker first, then one MODIFY per
/// `(table, entity_id)`, first occurrence winning.
pub struct BatchBuilder<'c> {
    clock: &'c dyn Clock,
    marker: ChangeMessage,
    seen: HashSet<(CatalogTable, String)>,
    rebuild: Vec<ChangeMessage>,
    duplicates: usize,
}

impl<'c> BatchBuilder<'c> {
    pub fn new(store_id: &str, clock: &'c dyn Clock) -> Self {
        Self {
            clock,
            marker: ChangeMessage::remove_all(store_id, clock.now_epoch_seconds()),
            seen: HashSet::new(),
            rebuild: Vec::new(),
            duplicates: 0,
        }
    }

    /// Fold records in; returns how many were added.
    pub fn fold<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = CatalogEntityRecord>,
    {
        let mut added = 0;
        for record in records {
            if classify(record.table, &record.entity_id) != EntityClass::Live {
                warn!(
                    table = %record.table,
                    entity_id = %record.entity_id,
                    "Refusing non-live row in batch"
                );
                continue;
            }
            if !self.seen.insert((record.table, record.entity_id.clone())) {
                self.duplicates += 1;
                continue;
            }
            self.rebuild
                .push(ChangeMessage::modify(&record, self.clock.now_epoch_seconds()));
            added += 1;
        }
        added
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn finish(self) -> ChangeBatch {
        ChangeBatch::from_parts(self.marker, self.rebuild)
    }
}

/// Assemble the batch for one store.
pub fn assemble(store_id: &str, catalog: StoreCatalog, clock: &dyn Clock) -> ChangeBatch {
    let mut builder = BatchBuilder::new(store_id, clock);
    for section in catalog.into_sections() {
        builder.fold(section);
    }
    let duplicates = builder.duplicates();
    let batch = builder.finish();
    debug!(
        store_id,
        rebuild = batch.rebuild().len(),
        categories = batch.rebuild_count(CatalogTable::Categories),
        products = batch.rebuild_count(CatalogTable::ProductsNew),
        options = batch.rebuild_count(CatalogTable::Options),
        choices = batch.rebuild_count(CatalogTable::Choices),
        duplicates,
        "Batch assembled"
    );
    batch
}
