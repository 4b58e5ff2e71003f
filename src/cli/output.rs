//! CLI output: rendering of invocation results and errors.

use crate::error::RebuildError;
use crate::pipeline::InvocationResult;
use serde_json::{json, Value};

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &RebuildError) -> String {
    format!("{} ({})", e, e.comment_id())
}

/// Result JSON, with the published bodies alongside it on dry runs.
pub fn format_run_output(
    result: &InvocationResult,
    published: Option<Vec<Vec<Value>>>,
) -> Result<String, RebuildError> {
    let rendered = match published {
        Some(published) => serde_json::to_string_pretty(&json!({
            "result": result,
            "published": published,
        }))?,
        None => serde_json::to_string_pretty(result)?,
    };
    Ok(rendered)
}
