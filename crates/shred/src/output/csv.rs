//! CSV writers. Quoting and escaping follow RFC 4180 via the csv crate;
//! nulls and absent columns serialize as a configurable sentinel.

use super::{table_path, OutputError, OutputFormat, StreamingWriter, TableWriter, WriterOptions};
use crate::naming::dedupe_headers;
use crate::Row;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

fn cell(value: Option<&Value>, null_string: &str) -> String {
    match value {
        None | Some(Value::Null) => null_string.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => if *b { "true" } else { "false" }.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            serde_json::to_string(other).expect("serializing a JSON value cannot fail")
        }
    }
}

fn open(path: &Path, delimiter: u8) -> Result<csv::Writer<fs::File>, OutputError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    Ok(csv::WriterBuilder::new().delimiter(delimiter).from_writer(file))
}

/// One-shot CSV writer. The header is the union of columns across all rows.
pub struct CsvWriter {
    delimiter: u8,
    null_string: String,
    include_header: bool,
}

impl CsvWriter {
    pub fn new(options: &WriterOptions) -> CsvWriter {
        CsvWriter {
            delimiter: options.delimiter,
            null_string: options.null_string.clone(),
            include_header: options.include_header,
        }
    }
}

impl TableWriter for CsvWriter {
    fn write_table(&self, rows: &[Row], path: &Path) -> Result<(), OutputError> {
        let mut columns: BTreeSet<&str> = BTreeSet::new();
        for row in rows {
            columns.extend(row.keys().map(String::as_str));
        }
        let columns: Vec<String> = columns.into_iter().map(str::to_string).collect();
        let header = dedupe_headers(&columns);

        let mut writer = open(path, self.delimiter)?;
        if self.include_header {
            writer.write_record(&header)?;
        }
        for row in rows {
            writer.write_record(
                columns.iter().map(|c| cell(row.get(c), &self.null_string)),
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}

struct TableState {
    writer: csv::Writer<fs::File>,
    columns: Vec<String>,
    warned: HashSet<String>,
}

/// Streaming CSV writer: one file per table under a base directory. The
/// header is frozen from the first batch of each table; columns appearing
/// in later batches are logged once and dropped, and columns missing from a
/// row serialize as the null sentinel.
pub struct CsvStreamingWriter {
    base: PathBuf,
    entity: String,
    delimiter: u8,
    null_string: String,
    include_header: bool,
    tables: HashMap<String, TableState>,
}

impl CsvStreamingWriter {
    pub fn new(base: &Path, entity: &str, options: &WriterOptions) -> CsvStreamingWriter {
        CsvStreamingWriter {
            base: base.to_path_buf(),
            entity: entity.to_string(),
            delimiter: options.delimiter,
            null_string: options.null_string.clone(),
            include_header: options.include_header,
            tables: HashMap::new(),
        }
    }

    fn write_records(&mut self, table: &str, rows: &[Row]) -> Result<(), OutputError> {
        if rows.is_empty() {
            return Ok(());
        }

        if !self.tables.contains_key(table) {
            let path = table_path(&self.base, table, OutputFormat::Csv);
            let mut writer = open(&path, self.delimiter)?;

            let mut columns: BTreeSet<&str> = BTreeSet::new();
            for row in rows {
                columns.extend(row.keys().map(String::as_str));
            }
            let columns: Vec<String> = columns.into_iter().map(str::to_string).collect();
            if self.include_header {
                writer.write_record(dedupe_headers(&columns))?;
            }
            self.tables.insert(
                table.to_string(),
                TableState {
                    writer,
                    columns,
                    warned: HashSet::new(),
                },
            );
        }

        let state = self.tables.get_mut(table).expect("state was just inserted");
        for row in rows {
            for key in row.keys() {
                if !state.columns.contains(key) && state.warned.insert(key.clone()) {
                    tracing::warn!(
                        table = table,
                        column = %key,
                        "column appeared after the header was written, dropping"
                    );
                }
            }
            state.writer.write_record(
                state
                    .columns
                    .iter()
                    .map(|c| cell(row.get(c), &self.null_string)),
            )?;
        }
        state.writer.flush()?;
        Ok(())
    }
}

impl StreamingWriter for CsvStreamingWriter {
    fn initialize_main_table(&mut self) -> Result<(), OutputError> {
        fs::create_dir_all(&self.base)?;
        Ok(())
    }

    fn initialize_child_table(&mut self, _name: &str) -> Result<(), OutputError> {
        fs::create_dir_all(&self.base)?;
        Ok(())
    }

    fn write_main_records(&mut self, rows: &[Row]) -> Result<(), OutputError> {
        let entity = self.entity.clone();
        self.write_records(&entity, rows)
    }

    fn write_child_records(&mut self, name: &str, rows: &[Row]) -> Result<(), OutputError> {
        self.write_records(name, rows)
    }

    fn finalize(&mut self) -> Result<(), OutputError> {
        for state in self.tables.values_mut() {
            state.writer.flush()?;
        }
        Ok(())
    }
}
