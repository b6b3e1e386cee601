//! Record identity: natural-id discovery and UUID generation.

use crate::config::{IdMode, ShredConfig};
use crate::Row;
use serde_json::Value;
use uuid::Uuid;

/// Namespace for version-5 ids. Frozen: changing it changes every
/// deterministic id ever issued.
pub const ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0xa9, 0xb8, 0xc7, 0xd6, 0xe5, 0xf4, 0x12, 0x34, 0xab, 0xcd, 0x01, 0x23, 0x45, 0x67,
    0x89, 0xab,
]);

/// Finds a natural identifier on `row`: the first probed field whose value
/// is a number, or a string with non-whitespace content. Returns the field
/// name and its value.
pub fn find_natural_id<'r>(
    row: &'r Row,
    patterns: impl IntoIterator<Item = &'r str>,
) -> Option<(&'r str, &'r Value)> {
    for pattern in patterns {
        if let Some(value) = row.get(pattern) {
            match value {
                Value::String(s) if !s.trim().is_empty() => return Some((pattern, value)),
                Value::Number(_) => return Some((pattern, value)),
                _ => {}
            }
        }
    }
    None
}

/// The identity of an annotated row: its discovered natural id, or the
/// value installed under the configured id column.
pub fn record_id<'r>(row: &'r Row, config: &'r ShredConfig) -> Option<&'r Value> {
    find_natural_id(row, config.discovery_patterns())
        .map(|(_, value)| value)
        .or_else(|| row.get(&config.id_field))
}

/// Generates an identifier for `row` according to the configured mode.
/// Callers invoke this only after natural discovery has come up empty, so
/// the natural mode falls through to a random id here.
pub fn generate_id(row: &Row, config: &ShredConfig) -> String {
    match config.id_mode {
        IdMode::Random | IdMode::Natural => Uuid::new_v4().to_string(),
        IdMode::DeterministicRecord => {
            deterministic_id(&canonical_json(&Value::Object(row.clone())))
        }
        IdMode::DeterministicFields => {
            deterministic_id(&canonical_fields(row, &config.id_fields))
        }
    }
}

fn deterministic_id(encoded: &str) -> String {
    let normalized = encoded.trim().to_lowercase();
    Uuid::new_v5(&ID_NAMESPACE, normalized.as_bytes()).to_string()
}

/// Canonical JSON: compact, object keys sorted recursively. The encoding is
/// written by hand so that it cannot be perturbed by map-ordering features
/// of the JSON library.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Canonical encoding of selected fields as a top-level object in the
/// listed order. Fields absent from the row encode as null.
fn canonical_fields(row: &Row, fields: &[String]) -> String {
    let mut out = String::from("{");
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&encode_string(field));
        out.push(':');
        match row.get(field) {
            Some(value) => write_canonical(value, &mut out),
            None => out.push_str("null"),
        }
    }
    out.push('}');
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&encode_string(s)),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&encode_string(key));
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

fn encode_string(s: &str) -> String {
    serde_json::to_string(s).expect("encoding a string cannot fail")
}
