//! Catalog Rebuild: per-store catalog change batches for the rule compiler
//!
//! Reads a store's categories, products, options and choices, drops reserved rows,
//! expands option/choice templates into the rows derived from them, and publishes a
//! REMOVE-all marker followed by one MODIFY per live entity to the compiler queue.

pub mod assemble;
pub mod attribute;
pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod expand;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod query;
pub mod rules;
pub mod source;
pub mod trigger;
pub mod types;
