//! In-memory result of a non-streaming run.

use crate::error::ShredError;
use crate::naming::sanitize_filename;
use crate::output::{create_writer, OutputFormat, WriterOptions};
use crate::Row;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// All tables produced by one processing run: the main table plus one child
/// table per distinct array path.
#[derive(Debug, Clone, PartialEq)]
pub struct ShredResult {
    entity: String,
    main: Vec<Row>,
    tables: BTreeMap<String, Vec<Row>>,
}

impl ShredResult {
    pub(crate) fn new(entity: &str) -> ShredResult {
        ShredResult {
            entity: entity.to_string(),
            main: Vec::new(),
            tables: BTreeMap::new(),
        }
    }

    /// The entity name the main table is known by.
    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    /// The main table: one row per input record.
    pub fn main(&self) -> &[Row] {
        &self.main
    }

    /// Child tables, keyed by table name.
    pub fn tables(&self) -> &BTreeMap<String, Vec<Row>> {
        &self.tables
    }

    /// Every table, with the main table under the entity name.
    pub fn all_tables(&self) -> BTreeMap<&str, &[Row]> {
        let mut all: BTreeMap<&str, &[Row]> = BTreeMap::new();
        all.insert(self.entity.as_str(), &self.main);
        for (name, rows) in &self.tables {
            all.insert(name, rows);
        }
        all
    }

    pub(crate) fn extend_main(&mut self, rows: Vec<Row>) {
        self.main.extend(rows);
    }

    pub(crate) fn merge_children(&mut self, children: BTreeMap<String, Vec<Row>>) {
        for (table, rows) in children {
            if rows.is_empty() {
                continue;
            }
            self.tables.entry(table).or_default().extend(rows);
        }
    }

    /// Saves every non-empty table. The format comes from `format` when
    /// given, else from the path's extension, defaulting to CSV.
    ///
    /// With child tables present, `path` names a directory and one file per
    /// table is produced inside it; otherwise `path` names the output file
    /// for the main table. Returns the written path per table name.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        format: Option<&str>,
        options: &WriterOptions,
    ) -> Result<BTreeMap<String, PathBuf>, ShredError> {
        let path = path.as_ref();

        let format_name = format
            .map(str::to_string)
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_string())
            })
            .unwrap_or_else(|| "csv".to_string());
        let format = OutputFormat::from_str(&format_name)
            .map_err(|err| ShredError::Validation(err.to_string()))?;

        tracing::info!(
            entity = %self.entity,
            format = %format,
            path = %path.display(),
            "saving result"
        );

        let writer = create_writer(format, options)?;
        let mut written = BTreeMap::new();

        if self.tables.is_empty() {
            let file = if path.extension().is_some() {
                path.to_path_buf()
            } else {
                path.with_extension(format.extension())
            };
            writer.write_table(&self.main, &file)?;
            written.insert(self.entity.clone(), file);
            return Ok(written);
        }

        // Multi-table: treat the path as a directory, shedding a file
        // extension if one was given.
        let dir = if path.extension().is_some() {
            path.with_extension("")
        } else {
            path.to_path_buf()
        };
        std::fs::create_dir_all(&dir).map_err(crate::output::OutputError::from)?;

        for (name, rows) in self.all_tables() {
            if rows.is_empty() {
                continue;
            }
            let file = dir.join(format!(
                "{}.{}",
                sanitize_filename(name),
                format.extension()
            ));
            writer.write_table(rows, &file)?;
            written.insert(name.to_string(), file);
        }
        Ok(written)
    }
}
