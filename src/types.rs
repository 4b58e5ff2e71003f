//! Core data model: stores, catalog tables, fetched records and change messages.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Plain attribute map of one row, after typed-attribute unwrapping.
pub type Attributes = serde_json::Map<String, Value>;

/// A store whose catalog rules need recomputing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreRef {
    pub store_id: String,
}

impl StoreRef {
    pub fn new(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
        }
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.store_id)
    }
}

/// Secondary index used to resolve template rows into concrete rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateIndex {
    pub index_name: &'static str,
    /// Attribute the index sorts on; matched with `begins_with`.
    pub attribute: &'static str,
}

/// The four source tables, in fold order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogTable {
    Categories,
    ProductsNew,
    Options,
    Choices,
}

impl CatalogTable {
    /// Fold order used by the assembler.
    pub const ALL: [CatalogTable; 4] = [
        CatalogTable::Categories,
        CatalogTable::ProductsNew,
        CatalogTable::Options,
        CatalogTable::Choices,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CatalogTable::Categories => "categories",
            CatalogTable::ProductsNew => "products_new",
            CatalogTable::Options => "options",
            CatalogTable::Choices => "choices",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.name() == name)
    }

    /// Sort-key attribute holding the entity id.
    pub fn sort_key(self) -> &'static str {
        match self {
            CatalogTable::Categories => "category_id",
            CatalogTable::ProductsNew => "product_id",
            CatalogTable::Options => "product_id_option_id",
            CatalogTable::Choices => "option_id_choice_id",
        }
    }

    pub fn template_index(self) -> Option<TemplateIndex> {
        match self {
            CatalogTable::Options => Some(TemplateIndex {
                index_name: "store_id-template_id_option_id-index",
                attribute: "template_id_option_id",
            }),
            CatalogTable::Choices => Some(TemplateIndex {
                index_name: "store_id-option_template_id_choice_id-index",
                attribute: "option_template_id_choice_id",
            }),
            CatalogTable::Categories | CatalogTable::ProductsNew => None,
        }
    }
}

impl fmt::Display for CatalogTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row fetched from a source table.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntityRecord {
    pub store_id: String,
    pub entity_id: String,
    pub table: CatalogTable,
    pub attributes: Attributes,
}

impl CatalogEntityRecord {
    /// Build a record from a raw row. Returns `None` when `store_id` or the sort key is missing.
    pub fn from_item(table: CatalogTable, item: Attributes) -> Option<Self> {
        let store_id = item.get("store_id")?.as_str()?.to_string();
        let entity_id = item.get(table.sort_key())?.as_str()?.to_string();
        Some(Self {
            store_id,
            entity_id,
            table,
            attributes: item,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventName {
    Insert,
    Modify,
    Remove,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::Insert => "INSERT",
            EventName::Modify => "MODIFY",
            EventName::Remove => "REMOVE",
        }
    }
}

/// Unit published to the rule-compilation queue.
///
/// Serializes flat: the entity id is written under the table's sort-key attribute,
/// next to the remaining projected attributes of the source row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeMessage {
    pub store_id: String,
    pub table: Option<CatalogTable>,
    pub entity_id: Option<String>,
    pub event_name: EventName,
    /// Fractional epoch seconds.
    pub approximate_creation_date_time: f64,
    pub attributes: Attributes,
}

impl ChangeMessage {
    /// Marker telling the consumer to discard every rule compiled for the store.
    pub fn remove_all(store_id: impl Into<String>, timestamp: f64) -> Self {
        Self {
            store_id: store_id.into(),
            table: None,
            entity_id: None,
            event_name: EventName::Remove,
            approximate_creation_date_time: timestamp,
            attributes: Attributes::new(),
        }
    }

    pub fn modify(record: &CatalogEntityRecord, timestamp: f64) -> Self {
        let mut attributes = record.attributes.clone();
        attributes.remove("store_id");
        attributes.remove(record.table.sort_key());
        Self {
            store_id: record.store_id.clone(),
            table: Some(record.table),
            entity_id: Some(record.entity_id.clone()),
            event_name: EventName::Modify,
            approximate_creation_date_time: timestamp,
            attributes,
        }
    }

    pub fn is_remove_all(&self) -> bool {
        self.event_name == EventName::Remove && self.entity_id.is_none()
    }

    /// Dedupe key within a batch.
    pub fn key(&self) -> Option<(CatalogTable, &str)> {
        match (self.table, self.entity_id.as_deref()) {
            (Some(table), Some(entity_id)) => Some((table, entity_id)),
            _ => None,
        }
    }
}

impl Serialize for ChangeMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("store_id", &self.store_id)?;
        if let Some(table) = self.table {
            map.serialize_entry("table", table.name())?;
            if let Some(entity_id) = &self.entity_id {
                map.serialize_entry(table.sort_key(), entity_id)?;
            }
        }
        for (key, value) in &self.attributes {
            match key.as_str() {
                "store_id" | "table" | "eventName" | "ApproximateCreationDateTime" => continue,
                _ => map.serialize_entry(key, value)?,
            }
        }
        map.serialize_entry("eventName", self.event_name.as_str())?;
        map.serialize_entry(
            "ApproximateCreationDateTime",
            &self.approximate_creation_date_time,
        )?;
        map.end()
    }
}

/// The full ordered set of change messages for one store in one run.
///
/// Always starts with exactly one REMOVE-all marker; rebuild messages are unique
/// by `(table, entity_id)`. Built only by [`crate::assemble::BatchBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    store_id: String,
    messages: Vec<ChangeMessage>,
}

impl ChangeBatch {
    pub(crate) fn from_parts(marker: ChangeMessage, rebuild: Vec<ChangeMessage>) -> Self {
        let store_id = marker.store_id.clone();
        let mut messages = Vec::with_capacity(rebuild.len() + 1);
        messages.push(marker);
        messages.extend(rebuild);
        Self { store_id, messages }
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn marker(&self) -> &ChangeMessage {
        &self.messages[0]
    }

    pub fn rebuild(&self) -> &[ChangeMessage] {
        &self.messages[1..]
    }

    /// Every message, marker first.
    pub fn messages(&self) -> &[ChangeMessage] {
        &self.messages
    }

    /// True when the store has no live catalog rows.
    pub fn is_empty(&self) -> bool {
        self.messages.len() == 1
    }

    pub fn rebuild_count(&self, table: CatalogTable) -> usize {
        self.rebuild()
            .iter()
            .filter(|message| message.table == Some(table))
            .count()
    }
}
