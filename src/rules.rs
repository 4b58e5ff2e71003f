//! Reserved-prefix rules for catalog entity ids.
//!
//! Every prefix the pipeline treats specially lives in [`PREFIX_RULES`]. Rules are
//! checked in order per table and the first match decides; an id matching no rule
//! is a live entity.

use crate::types::{CatalogEntityRecord, CatalogTable};
use tracing::debug;

/// Prefix marking a template row.
pub const TEMPLATE_PREFIX: &str = "all_";

/// What a reserved prefix means for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixClass {
    /// Test fixture or internal marker; never reaches the batch.
    Exclude,
    /// Template with no per-entity instances; dropped without expansion.
    CommentTemplate,
    /// Template to be expanded into concrete rows.
    Template,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixRule {
    pub table: CatalogTable,
    pub prefix: &'static str,
    pub class: PrefixClass,
}

const fn rule(table: CatalogTable, prefix: &'static str, class: PrefixClass) -> PrefixRule {
    PrefixRule {
        table,
        prefix,
        class,
    }
}

/// Ordered rule table. `all_comments` precedes `all_` so the specific rule wins.
pub const PREFIX_RULES: &[PrefixRule] = &[
    rule(CatalogTable::ProductsNew, "template", PrefixClass::Exclude),
    rule(CatalogTable::ProductsNew, "copy_", PrefixClass::Exclude),
    rule(CatalogTable::ProductsNew, "test", PrefixClass::Exclude),
    rule(CatalogTable::Options, "init_", PrefixClass::Exclude),
    rule(CatalogTable::Options, "test", PrefixClass::Exclude),
    rule(CatalogTable::Options, "all_comments", PrefixClass::CommentTemplate),
    rule(CatalogTable::Options, TEMPLATE_PREFIX, PrefixClass::Template),
    rule(CatalogTable::Choices, "is_preselected_", PrefixClass::Exclude),
    rule(CatalogTable::Choices, "test", PrefixClass::Exclude),
    rule(CatalogTable::Choices, "all_comments", PrefixClass::CommentTemplate),
    rule(CatalogTable::Choices, TEMPLATE_PREFIX, PrefixClass::Template),
];

/// Classification of one entity id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityClass {
    Live,
    Excluded,
    CommentTemplate,
    /// Template; carries the key after `all_`.
    Template(String),
}

pub fn classify(table: CatalogTable, entity_id: &str) -> EntityClass {
    let matched = PREFIX_RULES
        .iter()
        .find(|rule| rule.table == table && entity_id.starts_with(rule.prefix));
    match matched.map(|rule| rule.class) {
        None => EntityClass::Live,
        Some(PrefixClass::Exclude) => EntityClass::Excluded,
        Some(PrefixClass::CommentTemplate) => EntityClass::CommentTemplate,
        Some(PrefixClass::Template) => {
            EntityClass::Template(entity_id[TEMPLATE_PREFIX.len()..].to_string())
        }
    }
}

/// A template row and the key its concrete rows are indexed under.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRow {
    pub record: CatalogEntityRecord,
    pub template_key: String,
}

/// A table's rows split by classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partitioned {
    pub live: Vec<CatalogEntityRecord>,
    pub templates: Vec<TemplateRow>,
    pub excluded: usize,
}

/// Split fetched rows into live rows and templates, dropping everything else.
pub fn partition(records: Vec<CatalogEntityRecord>) -> Partitioned {
    let mut out = Partitioned::default();
    for record in records {
        match classify(record.table, &record.entity_id) {
            EntityClass::Live => out.live.push(record),
            EntityClass::Template(template_key) => out.templates.push(TemplateRow {
                record,
                template_key,
            }),
            EntityClass::Excluded | EntityClass::CommentTemplate => {
                debug!(
                    table = %record.table,
                    entity_id = %record.entity_id,
                    "Filtered non-production row"
                );
                out.excluded += 1;
            }
        }
    }
    out
}

/// Keep only rows classified live.
pub fn retain_live(records: Vec<CatalogEntityRecord>) -> Vec<CatalogEntityRecord> {
    records
        .into_iter()
        .filter(|record| classify(record.table, &record.entity_id) == EntityClass::Live)
        .collect()
}
