//! Rebuild Pipeline
//!
//! Orchestrates one invocation: classify the trigger, then for each store in turn
//! read the four catalog tables, filter and expand them, assemble the batch, publish
//! it and notify. Stores run strictly one after another so a store's REMOVE-then-rebuild
//! sequence is never interleaved with another store's. Any error aborts the invocation;
//! stores already dispatched stay dispatched.

use crate::assemble::{assemble, StoreCatalog};
use crate::clock::{Clock, SystemClock};
use crate::config::RebuildConfig;
use crate::dispatch::{QueueDispatcher, QueuePublisher};
use crate::error::RebuildError;
use crate::expand::TemplateExpander;
use crate::notify::{ChatNotifier, Notifier};
use crate::query::{Fetched, PaginatedQuery};
use crate::rules::partition;
use crate::source::{CatalogSource, QueryRequest};
use crate::trigger::{classify, Trigger};
use crate::types::{CatalogTable, ChangeBatch, StoreRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result reported back to the invocation harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl InvocationResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            comment_id: None,
            comments: None,
        }
    }

    pub fn failed(err: &RebuildError) -> Self {
        Self {
            success: false,
            comment_id: Some(err.comment_id().to_string()),
            comments: Some(err.to_string()),
        }
    }
}

/// A store's batch plus the tables whose reads hit the item cap.
#[derive(Debug, Clone)]
pub struct StoreBatch {
    pub batch: ChangeBatch,
    pub truncated_tables: Vec<CatalogTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreOutcome {
    pub store_id: String,
    pub messages: usize,
    pub chunks: usize,
    pub notified: bool,
    pub truncated_tables: Vec<CatalogTable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub stores: Vec<StoreOutcome>,
}

pub struct RebuildPipeline {
    query: PaginatedQuery,
    dispatcher: QueueDispatcher,
    notifier: Option<Notifier>,
    clock: Arc<dyn Clock>,
}

impl RebuildPipeline {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        publisher: Arc<dyn QueuePublisher>,
        config: &RebuildConfig,
    ) -> Self {
        Self {
            query: PaginatedQuery::new(source, config.query.clone()),
            dispatcher: QueueDispatcher::new(publisher, config.dispatch.clone()),
            notifier: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attach a chat client using the channel and process name from config.
    pub fn with_chat(self, client: Arc<dyn ChatNotifier>, config: &RebuildConfig) -> Self {
        let notifier = Notifier::new(
            client,
            config.notify.channel.clone(),
            config.process_name.clone(),
        );
        self.with_notifier(notifier)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one invocation payload and report the harness result.
    pub async fn handle(&self, payload: &Value) -> InvocationResult {
        let outcome = match Trigger::from_payload(payload) {
            Ok(trigger) => self.run(&trigger).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(summary) => {
                info!(stores = summary.stores.len(), "Invocation succeeded");
                InvocationResult::succeeded()
            }
            Err(err) => {
                error!(error = %err, comment_id = err.comment_id(), "Invocation failed");
                InvocationResult::failed(&err)
            }
        }
    }

    /// Rebuild every store the trigger selects, sequentially.
    pub async fn run(&self, trigger: &Trigger) -> Result<RunSummary, RebuildError> {
        let stores = classify(trigger)?;
        let mut summary = RunSummary::default();
        for store in &stores {
            let outcome = self.run_store(store).await?;
            summary.stores.push(outcome);
        }
        Ok(summary)
    }

    /// Build, publish and announce one store's batch.
    pub async fn run_store(&self, store: &StoreRef) -> Result<StoreOutcome, RebuildError> {
        info!(store_id = %store, "Rebuilding catalog rules");
        let StoreBatch {
            batch,
            truncated_tables,
        } = self.build_batch(store).await?;

        let report = self.dispatcher.dispatch(&batch).await?;

        let notified = match (&self.notifier, batch.is_empty()) {
            (Some(notifier), false) => notifier.notify_store(store).await,
            _ => false,
        };

        info!(
            store_id = %store,
            messages = report.messages,
            chunks = report.chunks,
            notified,
            "Store rebuild dispatched"
        );
        Ok(StoreOutcome {
            store_id: store.store_id.clone(),
            messages: report.messages,
            chunks: report.chunks,
            notified,
            truncated_tables,
        })
    }

    /// Read, filter, expand and assemble one store's batch without publishing it.
    pub async fn build_batch(&self, store: &StoreRef) -> Result<StoreBatch, RebuildError> {
        let store_id = store.store_id.as_str();
        let (categories, products, options, choices) = futures::try_join!(
            self.fetch_table(CatalogTable::Categories, store_id),
            self.fetch_table(CatalogTable::ProductsNew, store_id),
            self.fetch_table(CatalogTable::Options, store_id),
            self.fetch_table(CatalogTable::Choices, store_id),
        )?;

        let mut truncated_tables: Vec<CatalogTable> = [&categories, &products, &options, &choices]
            .into_iter()
            .filter(|(_, fetched)| fetched.truncated)
            .map(|(table, _)| *table)
            .collect();

        let categories = partition(categories.1.records);
        let products = partition(products.1.records);
        let options = partition(options.1.records);
        let choices = partition(choices.1.records);

        let expander = TemplateExpander::new(&self.query);
        let (expanded_options, expanded_choices) = futures::try_join!(
            expander.expand(CatalogTable::Options, &options.templates),
            expander.expand(CatalogTable::Choices, &choices.templates),
        )?;
        for (table, truncated) in [
            (CatalogTable::Options, expanded_options.truncated),
            (CatalogTable::Choices, expanded_choices.truncated),
        ] {
            if truncated && !truncated_tables.contains(&table) {
                truncated_tables.push(table);
            }
        }
        if !truncated_tables.is_empty() {
            warn!(store_id, tables = ?truncated_tables, "Batch built from capped reads");
        }

        let catalog = StoreCatalog {
            categories: categories.live,
            products: products.live,
            options: options.live,
            expanded_options: expanded_options.records,
            choices: choices.live,
            expanded_choices: expanded_choices.records,
        };
        let batch = assemble(store_id, catalog, self.clock.as_ref());
        Ok(StoreBatch {
            batch,
            truncated_tables,
        })
    }

    async fn fetch_table(
        &self,
        table: CatalogTable,
        store_id: &str,
    ) -> Result<(CatalogTable, Fetched), RebuildError> {
        let fetched = self
            .query
            .fetch(&QueryRequest::store_partition(table, store_id))
            .await?;
        Ok((table, fetched))
    }
}
