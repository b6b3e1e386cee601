//! Harvests arrays out of records into child-table row streams.

use crate::config::{ArrayMode, NullHandling, ShredConfig};
use crate::context::ProcessingContext;
use crate::flatten::{flatten_record, is_simple_array};
use crate::identity::record_id;
use crate::metadata::annotate;
use crate::naming::{child_table_name, sanitize};
use crate::{Record, Row};
use serde_json::Value;
use std::collections::BTreeMap;

/// Lazy stream of `(child table name, annotated row)` pairs for every array
/// descendant of one record.
///
/// Traversal is depth-first in key order; an array element's own descendants
/// are yielded immediately after the element's row, before the next element.
/// Each yielded row links to its parent: top-level array rows to the record
/// id supplied at construction, nested array rows to the id minted for their
/// enclosing element. No state is retained between pulls beyond the
/// traversal stack itself.
pub struct ChildRows<'a> {
    config: &'a ShredConfig,
    entity: &'a str,
    stack: Vec<Frame<'a>>,
}

enum Frame<'a> {
    /// Walking the entries of an object, looking for arrays to harvest and
    /// objects to descend into.
    Object {
        entries: serde_json::map::Iter<'a>,
        context: ProcessingContext,
        parent_id: Option<Value>,
    },
    /// Walking the elements of one array already assigned to a table.
    Array {
        items: std::slice::Iter<'a, Value>,
        table: String,
        element_context: ProcessingContext,
        parent_id: Option<Value>,
    },
}

impl<'a> ChildRows<'a> {
    pub fn new(
        record: &'a Record,
        entity: &'a str,
        config: &'a ShredConfig,
        context: ProcessingContext,
        parent_id: Option<Value>,
    ) -> ChildRows<'a> {
        let mut stack = Vec::new();
        // Arrays are only harvested in the extracting modes; inline and
        // skip keep or drop them during flattening.
        let extracting = matches!(config.array_mode, ArrayMode::Smart | ArrayMode::Separate);
        if extracting && context.current_depth < config.max_depth {
            stack.push(Frame::Object {
                entries: record.iter(),
                context,
                parent_id,
            });
        }
        ChildRows {
            config,
            entity,
            stack,
        }
    }
}

impl<'a> Iterator for ChildRows<'a> {
    type Item = (String, Row);

    fn next(&mut self) -> Option<(String, Row)> {
        loop {
            let frame = self.stack.last_mut()?;
            match frame {
                Frame::Object {
                    entries,
                    context,
                    parent_id,
                } => {
                    let Some((key, value)) = entries.next() else {
                        self.stack.pop();
                        continue;
                    };
                    if key.starts_with("__") {
                        continue;
                    }
                    match value {
                        Value::Array(items) if !items.is_empty() => {
                            if self.config.array_mode == ArrayMode::Smart
                                && is_simple_array(items)
                            {
                                continue;
                            }
                            let table = child_table_name(
                                self.entity,
                                &context.build_path(&self.config.separator),
                                key,
                                &self.config.separator,
                            );
                            let element_context = context.descend(sanitize(key));
                            let parent_id = parent_id.clone();
                            self.stack.push(Frame::Array {
                                items: items.iter(),
                                table,
                                element_context,
                                parent_id,
                            });
                        }
                        Value::Object(map) if !map.is_empty() => {
                            let nested = context.descend(sanitize(key));
                            if nested.current_depth >= self.config.max_depth {
                                tracing::warn!(
                                    max_depth = self.config.max_depth,
                                    path = %nested.build_path(&self.config.separator),
                                    "maximum depth reached, truncating sub-tree"
                                );
                                continue;
                            }
                            let parent_id = parent_id.clone();
                            self.stack.push(Frame::Object {
                                entries: map.iter(),
                                context: nested,
                                parent_id,
                            });
                        }
                        _ => {}
                    }
                }
                Frame::Array {
                    items,
                    table,
                    element_context,
                    parent_id,
                } => {
                    let Some(item) = items.next() else {
                        self.stack.pop();
                        continue;
                    };
                    match item {
                        Value::Null if self.config.null_handling == NullHandling::Skip => {
                            continue;
                        }
                        Value::Object(map) if map.is_empty() => continue,
                        Value::Object(map) => {
                            // Array elements are records of their own table:
                            // fresh depth and path, inherited timestamp.
                            let mut row =
                                flatten_record(map, self.config, &element_context.element());
                            annotate(
                                &mut row,
                                self.config,
                                parent_id.as_ref(),
                                &element_context.extract_time,
                            );
                            let minted = record_id(&row, self.config).cloned();
                            let table = table.clone();
                            let nested = element_context.clone();
                            if nested.current_depth < self.config.max_depth {
                                self.stack.push(Frame::Object {
                                    entries: map.iter(),
                                    context: nested,
                                    parent_id: minted,
                                });
                            } else {
                                tracing::warn!(
                                    max_depth = self.config.max_depth,
                                    path = %nested.build_path(&self.config.separator),
                                    "maximum depth reached, truncating sub-tree"
                                );
                            }
                            return Some((table, row));
                        }
                        primitive => {
                            let mut row = Row::new();
                            row.insert("value".to_string(), primitive.clone());
                            annotate(
                                &mut row,
                                self.config,
                                parent_id.as_ref(),
                                &element_context.extract_time,
                            );
                            return Some((table.clone(), row));
                        }
                    }
                }
            }
        }
    }
}

/// Eagerly materializes the child-row stream of one record, grouped by
/// table name. Row order within a table matches the stream order.
pub fn extract_arrays(
    record: &Record,
    entity: &str,
    config: &ShredConfig,
    context: ProcessingContext,
    parent_id: Option<Value>,
) -> BTreeMap<String, Vec<Row>> {
    let mut result: BTreeMap<String, Vec<Row>> = BTreeMap::new();
    for (table, row) in ChildRows::new(record, entity, config, context, parent_id) {
        result.entry(table).or_default().push(row);
    }
    result
}
