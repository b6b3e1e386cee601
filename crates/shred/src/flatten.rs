//! Collapses nested records into single-level rows.

use crate::config::{ArrayMode, NullHandling, ShredConfig};
use crate::context::ProcessingContext;
use crate::naming::sanitize;
use crate::{Record, Row};
use serde_json::Value;

/// Sentinel emitted for NaN and infinite floats under stringification.
/// Writers never see a non-finite float.
pub const INVALID_FLOAT_SENTINEL: &str = "_error_invalid_float";

/// True when every element of `array` is a scalar. Empty arrays count as
/// simple.
pub fn is_simple_array(array: &[Value]) -> bool {
    array
        .iter()
        .all(|item| !matches!(item, Value::Object(_) | Value::Array(_)))
}

/// Normalizes one scalar for output. Returns `None` when the value is
/// omitted under the configured null handling.
pub fn coerce_value(value: &Value, config: &ShredConfig) -> Option<Value> {
    let is_empty = value.is_null() || value.as_str().is_some_and(|s| s.is_empty());
    if is_empty {
        return match config.null_handling {
            NullHandling::Skip => None,
            NullHandling::Include => Some(Value::String(String::new())),
        };
    }

    if let Value::Number(n) = value {
        if n.as_f64().is_some_and(|f| !f.is_finite()) {
            return Some(if config.cast_to_string {
                Value::String(INVALID_FLOAT_SENTINEL.to_string())
            } else {
                value.clone()
            });
        }
    }

    if config.cast_to_string {
        return Some(match value {
            Value::Bool(b) => Value::String(if *b { "true" } else { "false" }.to_string()),
            Value::String(_) => value.clone(),
            Value::Number(n) => Value::String(n.to_string()),
            other => Value::String(
                serde_json::to_string(other).expect("serializing a JSON value cannot fail"),
            ),
        });
    }

    Some(value.clone())
}

/// Flattens `record` into a single-level row.
///
/// Nested object keys become path-named columns joined by the configured
/// separator, with each component sanitized. Keys with a `__` prefix are
/// metadata already present on the record and pass through untouched.
/// Arrays follow the configured array mode; in smart mode, arrays of
/// scalars stay inline and everything else is left for the extractor.
pub fn flatten_record(
    record: &Record,
    config: &ShredConfig,
    context: &ProcessingContext,
) -> Row {
    let mut result = Row::new();

    if context.current_depth >= config.max_depth {
        let path = context.build_path(&config.separator);
        tracing::warn!(
            max_depth = config.max_depth,
            path = %path,
            "maximum depth reached, truncating sub-tree"
        );
        return result;
    }

    for (key, value) in record {
        if key.starts_with("__") {
            result.insert(key.clone(), value.clone());
            continue;
        }

        let nested = context.descend(sanitize(key));
        let current_path = nested.build_path(&config.separator);

        match value {
            Value::Object(map) => {
                if map.is_empty() {
                    continue;
                }
                for (flat_key, flat_value) in flatten_record(map, config, &nested) {
                    result.insert(flat_key, flat_value);
                }
            }
            Value::Array(items) => {
                if items.is_empty() {
                    continue;
                }
                match config.array_mode {
                    ArrayMode::Skip | ArrayMode::Separate => {}
                    ArrayMode::Smart => {
                        if is_simple_array(items) {
                            result.insert(current_path, value.clone());
                        }
                    }
                    ArrayMode::Inline => {
                        if let Some(coerced) = coerce_value(value, config) {
                            result.insert(current_path, coerced);
                        }
                    }
                }
            }
            scalar => {
                if let Some(coerced) = coerce_value(scalar, config) {
                    result.insert(current_path, coerced);
                }
            }
        }
    }

    result
}
