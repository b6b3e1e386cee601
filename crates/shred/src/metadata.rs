//! Row metadata: identity, parentage, and timestamp columns.

use crate::config::ShredConfig;
use crate::identity::{find_natural_id, generate_id};
use crate::Row;
use serde_json::Value;

/// Current UTC time in the run-timestamp format.
pub fn current_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}

/// Annotates `row` in place with identity, parent, and timestamp columns.
///
/// An id is installed at the configured id column only when the row carries
/// no discoverable natural id. The parent and time columns are always
/// installed when applicable, replacing any data column of the same name:
/// metadata wins collisions. Callers that need the unannotated row must
/// clone before calling.
pub fn annotate(
    row: &mut Row,
    config: &ShredConfig,
    parent_id: Option<&Value>,
    timestamp: &str,
) {
    if find_natural_id(row, config.discovery_patterns()).is_none() {
        let id = generate_id(row, config);
        row.insert(config.id_field.clone(), Value::String(id));
    }

    if let Some(parent_id) = parent_id {
        row.insert(config.parent_field.clone(), parent_id.clone());
    }

    if let Some(time_field) = config.time_field_name() {
        row.insert(time_field.to_string(), Value::String(timestamp.to_string()));
    }
}
