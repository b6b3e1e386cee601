//! JSONL writers: one compact JSON document per line, one file per table.

use super::{table_path, OutputError, OutputFormat, StreamingWriter, TableWriter, WriterOptions};
use crate::Row;
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

fn open(path: &Path) -> Result<BufWriter<fs::File>, OutputError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(fs::File::create(path)?))
}

fn write_rows(writer: &mut BufWriter<fs::File>, rows: &[Row]) -> Result<(), OutputError> {
    for row in rows {
        serde_json::to_writer(&mut *writer, row)
            .map_err(|err| OutputError::Encode(err.to_string()))?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// One-shot JSONL writer. Rows are schema-free, so no column union is
/// needed.
pub struct JsonlWriter;

impl JsonlWriter {
    pub fn new(_options: &WriterOptions) -> JsonlWriter {
        JsonlWriter
    }
}

impl TableWriter for JsonlWriter {
    fn write_table(&self, rows: &[Row], path: &Path) -> Result<(), OutputError> {
        let mut writer = open(path)?;
        write_rows(&mut writer, rows)?;
        writer.flush()?;
        Ok(())
    }
}

/// Streaming JSONL writer: table files open lazily on first write and are
/// flushed after every batch, so an aborted run leaves complete documents
/// up to the last flush.
pub struct JsonlStreamingWriter {
    base: PathBuf,
    entity: String,
    tables: HashMap<String, BufWriter<fs::File>>,
}

impl JsonlStreamingWriter {
    pub fn new(base: &Path, entity: &str, _options: &WriterOptions) -> JsonlStreamingWriter {
        JsonlStreamingWriter {
            base: base.to_path_buf(),
            entity: entity.to_string(),
            tables: HashMap::new(),
        }
    }

    fn write_records(&mut self, table: &str, rows: &[Row]) -> Result<(), OutputError> {
        if rows.is_empty() {
            return Ok(());
        }
        if !self.tables.contains_key(table) {
            let path = table_path(&self.base, table, OutputFormat::Jsonl);
            self.tables.insert(table.to_string(), open(&path)?);
        }
        let writer = self.tables.get_mut(table).expect("writer was just opened");
        write_rows(writer, rows)?;
        writer.flush()?;
        Ok(())
    }
}

impl StreamingWriter for JsonlStreamingWriter {
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
        for writer in self.tables.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}
