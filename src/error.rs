//! Error types for the catalog rebuild pipeline.

use crate::types::CatalogTable;
use thiserror::Error;

/// Errors raised by the external transports (store, queue, chat).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Throttling and availability problems are worth another attempt; rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Throttled(_) => true,
            TransportError::Unavailable(_) => true,
            TransportError::Rejected(_) => false,
        }
    }
}

/// Pipeline errors. Every variant aborts the whole invocation.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Query on {table} failed after {attempts} attempt(s): {source}")]
    QueryFailed {
        table: CatalogTable,
        attempts: usize,
        #[source]
        source: TransportError,
    },

    #[error("Dispatch for store {store_id} failed: {failed} of {total} publish(es) did not go through")]
    DispatchFailed {
        store_id: String,
        failed: usize,
        total: usize,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RebuildError {
    /// Identifier reported in the invocation result. Unrecognized kinds collapse to `classic_error`.
    pub fn comment_id(&self) -> &'static str {
        match self {
            RebuildError::InvalidParameters(_) => "invalid_params",
            RebuildError::QueryFailed { .. } => "query_failed",
            RebuildError::DispatchFailed { .. } => "dispatch_failed",
            _ => "classic_error",
        }
    }
}

impl From<config::ConfigError> for RebuildError {
    fn from(err: config::ConfigError) -> Self {
        RebuildError::ConfigError(err.to_string())
    }
}
