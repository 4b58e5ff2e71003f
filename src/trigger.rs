//! Trigger classification: turns an invocation payload into the stores to rebuild.
//!
//! Two trigger shapes are accepted: a batch of store-account change-stream records,
//! or a direct request naming one store. Stream records only select a store when the
//! change can affect its catalog rules (inserts, removals, and schedule edits).

use crate::attribute::{prune_nulls, unwrap_image};
use crate::error::RebuildError;
use crate::types::{Attributes, EventName, StoreRef};
use serde_json::Value;
use tracing::{debug, info};

/// Store-account fields whose edits require a catalog rebuild.
pub const SCHEDULE_FIELDS: [&str; 2] = ["schedule", "pickupSchedule"];

/// One change-stream record with unwrapped snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub event_name: EventName,
    pub new_image: Option<Attributes>,
    pub old_image: Option<Attributes>,
}

impl StreamRecord {
    pub fn new(
        event_name: EventName,
        new_image: Option<Attributes>,
        old_image: Option<Attributes>,
    ) -> Self {
        Self {
            event_name,
            new_image,
            old_image,
        }
    }

    /// Parse a raw stream record (`{eventName, dynamodb: {NewImage, OldImage}}`).
    pub fn from_value(raw: &Value) -> Result<Self, RebuildError> {
        // Anything other than INSERT/MODIFY is handled as a removal.
        let event_name = match raw.get("eventName").and_then(Value::as_str) {
            Some("INSERT") => EventName::Insert,
            Some("MODIFY") => EventName::Modify,
            _ => EventName::Remove,
        };
        let change = raw.get("dynamodb");
        let image = |name: &str| -> Result<Option<Attributes>, RebuildError> {
            match change.and_then(|c| c.get(name)) {
                Some(image) if !image.is_null() => Ok(Some(prune_nulls(unwrap_image(image)?))),
                _ => Ok(None),
            }
        };
        Ok(Self {
            event_name,
            new_image: image("NewImage")?,
            old_image: image("OldImage")?,
        })
    }
}

/// Inbound trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Stream(Vec<StreamRecord>),
    Direct(StoreRef),
}

impl Trigger {
    /// Parse an invocation payload: `{"Records": [...]}` or `{"store_id": "..."}`.
    ///
    /// A nonempty `Records` array wins over `store_id`.
    pub fn from_payload(payload: &Value) -> Result<Self, RebuildError> {
        let records = payload
            .get("Records")
            .and_then(Value::as_array)
            .filter(|records| !records.is_empty());
        if let Some(records) = records {
            let parsed = records
                .iter()
                .map(StreamRecord::from_value)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Trigger::Stream(parsed));
        }

        match payload.get("store_id").and_then(Value::as_str) {
            Some(store_id) if !store_id.is_empty() => Ok(Trigger::Direct(StoreRef::new(store_id))),
            _ => Err(invalid_params()),
        }
    }
}

/// Resolve the stores a trigger affects, in trigger order.
///
/// Repeated stores are kept: each occurrence is rebuilt again downstream.
pub fn classify(trigger: &Trigger) -> Result<Vec<StoreRef>, RebuildError> {
    match trigger {
        Trigger::Direct(store) => {
            info!(store_id = %store, "Direct rebuild request");
            Ok(vec![store.clone()])
        }
        Trigger::Stream(records) => {
            if records.is_empty() {
                return Err(invalid_params());
            }
            info!(records = records.len(), "Classifying store-account stream records");
            let mut stores = Vec::new();
            for record in records {
                if let Some(store) = classify_record(record)? {
                    stores.push(store);
                }
            }
            info!(stores = stores.len(), "Stream records classified");
            Ok(stores)
        }
    }
}

fn classify_record(record: &StreamRecord) -> Result<Option<StoreRef>, RebuildError> {
    match record.event_name {
        EventName::Insert => store_ref(record.new_image.as_ref()).map(Some),
        EventName::Remove => store_ref(record.old_image.as_ref()).map(Some),
        EventName::Modify => {
            let new_image = record.new_image.as_ref().ok_or_else(invalid_params)?;
            let old_image = record.old_image.as_ref();
            let changed = SCHEDULE_FIELDS.iter().any(|field| {
                new_image.get(*field) != old_image.and_then(|old| old.get(*field))
            });
            let store = store_ref(Some(new_image))?;
            if changed {
                Ok(Some(store))
            } else {
                debug!(store_id = %store, "Schedule unchanged; skipping record");
                Ok(None)
            }
        }
    }
}

fn store_ref(image: Option<&Attributes>) -> Result<StoreRef, RebuildError> {
    image
        .and_then(|image| image.get("store_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(StoreRef::new)
        .ok_or_else(invalid_params)
}

fn invalid_params() -> RebuildError {
    RebuildError::InvalidParameters("invalid_params".to_string())
}
