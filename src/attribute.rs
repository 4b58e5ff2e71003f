//! Typed attribute unwrapping for change-stream images.
//!
//! Stream snapshots encode every attribute as a single-key object naming its type
//! (`{"S": "abc"}`, `{"N": "12"}`, `{"M": {...}}`, ...). The classifier compares plain
//! JSON, so images are unwrapped first and null attributes pruned: a `NULL` attribute
//! and an absent attribute are treated the same.

use crate::error::RebuildError;
use crate::types::Attributes;
use serde_json::{Number, Value};

/// Unwrap a typed image (`{"attr": {"S": ..}, ...}`) into plain attributes.
pub fn unwrap_image(image: &Value) -> Result<Attributes, RebuildError> {
    let fields = image.as_object().ok_or_else(|| {
        RebuildError::InvalidParameters("stream image is not an object".to_string())
    })?;
    let mut out = Attributes::new();
    for (name, typed) in fields {
        if let Some(value) = unwrap_value(typed)? {
            out.insert(name.clone(), value);
        }
    }
    Ok(out)
}

/// Unwrap one typed value. `Ok(None)` means the attribute is null.
pub fn unwrap_value(typed: &Value) -> Result<Option<Value>, RebuildError> {
    let fields = typed.as_object().filter(|fields| fields.len() == 1).ok_or_else(|| {
        RebuildError::InvalidParameters(format!("malformed typed attribute: {}", typed))
    })?;
    let (tag, inner) = fields
        .iter()
        .next()
        .ok_or_else(|| RebuildError::InvalidParameters("empty typed attribute".to_string()))?;

    let value = match tag.as_str() {
        "NULL" => return Ok(None),
        "S" | "B" => Value::String(expect_str(tag, inner)?.to_string()),
        "BOOL" => Value::Bool(inner.as_bool().ok_or_else(|| type_mismatch(tag, inner))?),
        "N" => parse_number(expect_str(tag, inner)?)?,
        "SS" | "BS" => Value::Array(
            expect_array(tag, inner)?
                .iter()
                .map(|item| expect_str(tag, item).map(|s| Value::String(s.to_string())))
                .collect::<Result<_, _>>()?,
        ),
        "NS" => Value::Array(
            expect_array(tag, inner)?
                .iter()
                .map(|item| expect_str(tag, item).and_then(parse_number))
                .collect::<Result<_, _>>()?,
        ),
        "L" => {
            let mut items = Vec::new();
            for item in expect_array(tag, inner)? {
                if let Some(value) = unwrap_value(item)? {
                    items.push(value);
                }
            }
            Value::Array(items)
        }
        "M" => Value::Object(unwrap_image(inner)?),
        other => {
            return Err(RebuildError::InvalidParameters(format!(
                "unknown attribute type tag '{}'",
                other
            )))
        }
    };
    Ok(Some(value))
}

/// Recursively drop null members of already-plain attributes.
pub fn prune_nulls(attributes: Attributes) -> Attributes {
    attributes
        .into_iter()
        .filter_map(|(key, value)| prune_value(value).map(|value| (key, value)))
        .collect()
}

fn prune_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => Some(Value::Object(prune_nulls(map))),
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(prune_value).collect(),
        )),
        other => Some(other),
    }
}

/// Integral values come out as integers whatever their spelling, so `"1"`, `"1.0"`
/// and `"1e0"` compare equal.
fn parse_number(raw: &str) -> Result<Value, RebuildError> {
    if let Ok(int) = raw.parse::<i64>() {
        return Ok(Value::Number(int.into()));
    }
    let float = raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|float| float.is_finite())
        .ok_or_else(|| RebuildError::InvalidParameters(format!("invalid number '{}'", raw)))?;
    if float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64 {
        return Ok(Value::Number((float as i64).into()));
    }
    Number::from_f64(float)
        .map(Value::Number)
        .ok_or_else(|| RebuildError::InvalidParameters(format!("invalid number '{}'", raw)))
}

fn expect_str<'a>(tag: &str, value: &'a Value) -> Result<&'a str, RebuildError> {
    value.as_str().ok_or_else(|| type_mismatch(tag, value))
}

fn expect_array<'a>(tag: &str, value: &'a Value) -> Result<&'a Vec<Value>, RebuildError> {
    value.as_array().ok_or_else(|| type_mismatch(tag, value))
}

fn type_mismatch(tag: &str, value: &Value) -> RebuildError {
    RebuildError::InvalidParameters(format!("attribute tagged {} has value {}", tag, value))
}
