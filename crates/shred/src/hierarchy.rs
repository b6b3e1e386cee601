//! Composes flattening and extraction for whole records.

use crate::config::ShredConfig;
use crate::context::ProcessingContext;
use crate::extract::{extract_arrays, ChildRows};
use crate::flatten::flatten_record;
use crate::identity::record_id;
use crate::metadata::annotate;
use crate::{Record, Row};
use serde_json::Value;
use std::collections::BTreeMap;

/// Processes one record into its main row and eagerly collected child
/// tables. Empty records yield `None`.
pub fn process_record(
    record: &Record,
    entity: &str,
    config: &ShredConfig,
    context: &ProcessingContext,
    parent_id: Option<&Value>,
) -> Option<(Row, BTreeMap<String, Vec<Row>>)> {
    let (main_row, record_id) = main_row(record, config, context, parent_id)?;
    let children = extract_arrays(record, entity, config, context.clone(), record_id);
    Some((main_row, children))
}

/// Streaming variant: the child rows are a lazy iterator borrowing the
/// record. The main row is produced up front so its identity can seed the
/// children's parent links.
pub fn process_record_stream<'a>(
    record: &'a Record,
    entity: &'a str,
    config: &'a ShredConfig,
    context: &ProcessingContext,
    parent_id: Option<&Value>,
) -> Option<(Row, ChildRows<'a>)> {
    let (main_row, record_id) = main_row(record, config, context, parent_id)?;
    let children = ChildRows::new(record, entity, config, context.clone(), record_id);
    Some((main_row, children))
}

/// Processes a batch of records, merging child rows by table name. Rows
/// from earlier records appear first within each table.
pub fn process_batch(
    records: &[Record],
    entity: &str,
    config: &ShredConfig,
    context: &ProcessingContext,
) -> (Vec<Row>, BTreeMap<String, Vec<Row>>) {
    let mut main_rows = Vec::with_capacity(records.len());
    let mut all_children: BTreeMap<String, Vec<Row>> = BTreeMap::new();

    for record in records {
        let Some((main_row, children)) = process_record(record, entity, config, context, None)
        else {
            continue;
        };
        main_rows.push(main_row);
        for (table, rows) in children {
            all_children.entry(table).or_default().extend(rows);
        }
    }

    (main_rows, all_children)
}

fn main_row(
    record: &Record,
    config: &ShredConfig,
    context: &ProcessingContext,
    parent_id: Option<&Value>,
) -> Option<(Row, Option<Value>)> {
    if record.is_empty() {
        return None;
    }
    let mut row = flatten_record(record, config, context);
    annotate(&mut row, config, parent_id, &context.extract_time);

    // The id read back here (discovered or freshly installed) seeds the
    // parent links of every extracted child row.
    let id = record_id(&row, config).cloned();
    Some((row, id))
}
