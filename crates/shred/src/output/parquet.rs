//! Parquet writers built on arrow. Rows are decoded into record batches
//! against a schema inferred from the first batch of each table.

use super::{table_path, OutputError, OutputFormat, StreamingWriter, TableWriter, WriterOptions};
use crate::Row;
use arrow::datatypes::SchemaRef;
use arrow::json::reader::{infer_json_schema_from_iterator, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn parse_compression(name: &str) -> Result<Compression, OutputError> {
    match name.to_ascii_lowercase().as_str() {
        "none" | "uncompressed" => Ok(Compression::UNCOMPRESSED),
        "snappy" => Ok(Compression::SNAPPY),
        "gzip" => Ok(Compression::GZIP(GzipLevel::default())),
        "zstd" => Ok(Compression::ZSTD(ZstdLevel::default())),
        "lz4" => Ok(Compression::LZ4),
        other => Err(OutputError::Encode(format!(
            "unsupported parquet compression: '{other}'"
        ))),
    }
}

fn encode_err(err: impl std::fmt::Display) -> OutputError {
    OutputError::Encode(err.to_string())
}

fn infer_schema(rows: &[Row]) -> Result<SchemaRef, OutputError> {
    let schema = infer_json_schema_from_iterator(
        rows.iter()
            .map(|row| Ok::<_, arrow::error::ArrowError>(Value::Object(row.clone()))),
    )
    .map_err(encode_err)?;
    Ok(Arc::new(schema))
}

fn decode_batch(schema: &SchemaRef, rows: &[Row]) -> Result<Option<RecordBatch>, OutputError> {
    let mut decoder = ReaderBuilder::new(schema.clone())
        .with_strict_mode(false)
        .build_decoder()
        .map_err(encode_err)?;
    decoder.serialize(rows).map_err(encode_err)?;
    decoder.flush().map_err(encode_err)
}

fn properties(compression: Compression, row_group_size: usize) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(compression)
        .set_max_row_group_size(row_group_size)
        .build()
}

fn create_file(path: &Path) -> Result<fs::File, OutputError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(fs::File::create(path)?)
}

/// One-shot Parquet writer. The schema is the union of columns across all
/// rows. Writing an empty table is a no-op: a parquet file cannot carry
/// zero columns.
pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new(options: &WriterOptions) -> Result<ParquetWriter, OutputError> {
        Ok(ParquetWriter {
            compression: parse_compression(&options.compression)?,
            row_group_size: options.row_group_size,
        })
    }
}

impl TableWriter for ParquetWriter {
    fn write_table(&self, rows: &[Row], path: &Path) -> Result<(), OutputError> {
        if rows.is_empty() {
            return Ok(());
        }
        let schema = infer_schema(rows)?;
        let file = create_file(path)?;
        let mut writer = ArrowWriter::try_new(
            file,
            schema.clone(),
            Some(properties(self.compression, self.row_group_size)),
        )
        .map_err(encode_err)?;

        if let Some(batch) = decode_batch(&schema, rows)? {
            writer.write(&batch).map_err(encode_err)?;
        }
        writer.close().map_err(encode_err)?;
        Ok(())
    }
}

struct TableState {
    writer: ArrowWriter<fs::File>,
    schema: SchemaRef,
    warned: HashSet<String>,
}

/// Streaming Parquet writer: one file per table, schema frozen from the
/// first batch of each table. Columns appearing in later batches go to a
/// logged error channel and are dropped; each batch is flushed as a row
/// group, so a cancelled run leaves all fully-written row groups readable.
pub struct ParquetStreamingWriter {
    base: PathBuf,
    entity: String,
    compression: Compression,
    row_group_size: usize,
    tables: HashMap<String, TableState>,
}

impl ParquetStreamingWriter {
    pub fn new(
        base: &Path,
        entity: &str,
        options: &WriterOptions,
    ) -> Result<ParquetStreamingWriter, OutputError> {
        Ok(ParquetStreamingWriter {
            base: base.to_path_buf(),
            entity: entity.to_string(),
            compression: parse_compression(&options.compression)?,
            row_group_size: options.row_group_size,
            tables: HashMap::new(),
        })
    }

    fn write_records(&mut self, table: &str, rows: &[Row]) -> Result<(), OutputError> {
        if rows.is_empty() {
            return Ok(());
        }

        if !self.tables.contains_key(table) {
            let schema = infer_schema(rows)?;
            let path = table_path(&self.base, table, OutputFormat::Parquet);
            let file = create_file(&path)?;
            let writer = ArrowWriter::try_new(
                file,
                schema.clone(),
                Some(properties(self.compression, self.row_group_size)),
            )
            .map_err(encode_err)?;
            self.tables.insert(
                table.to_string(),
                TableState {
                    writer,
                    schema,
                    warned: HashSet::new(),
                },
            );
        }

        let state = self.tables.get_mut(table).expect("state was just inserted");
        for row in rows {
            for key in row.keys() {
                if state.schema.field_with_name(key).is_err() && state.warned.insert(key.clone())
                {
                    tracing::warn!(
                        table = table,
                        column = %key,
                        "column appeared after the schema was frozen, dropping"
                    );
                }
            }
        }

        if let Some(batch) = decode_batch(&state.schema, rows)? {
            state.writer.write(&batch).map_err(encode_err)?;
        }
        // Cut a row group so everything written so far survives a crash.
        state.writer.flush().map_err(encode_err)?;
        Ok(())
    }
}

impl StreamingWriter for ParquetStreamingWriter {
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
        for (_, state) in self.tables.drain() {
            state.writer.close().map_err(encode_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().expect("object literal").clone()
    }

    fn read_back(path: &Path) -> (Vec<String>, usize) {
        let file = fs::File::open(path).expect("open parquet");
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .expect("reader builder")
            .build()
            .expect("reader");
        let mut columns = Vec::new();
        let mut rows = 0;
        for batch in reader {
            let batch = batch.expect("batch");
            if columns.is_empty() {
                columns = batch
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.name().clone())
                    .collect();
            }
            rows += batch.num_rows();
        }
        (columns, rows)
    }

    #[test]
    fn rows_round_trip_through_a_parquet_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let rows = vec![
            row(json!({"a": "1", "b": "x"})),
            row(json!({"a": "2", "c": "y"})),
        ];
        ParquetWriter::new(&WriterOptions::default())
            .expect("construct")
            .write_table(&rows, &path)
            .expect("write");

        let (mut columns, count) = read_back(&path);
        columns.sort();
        assert_eq!(vec!["a", "b", "c"], columns);
        assert_eq!(2, count);
    }

    #[test]
    fn invalid_compression_fails_at_construction() {
        let options = WriterOptions {
            compression: "brotli-ish".to_string(),
            ..WriterOptions::default()
        };
        assert!(ParquetWriter::new(&options).is_err());
    }

    #[test]
    fn streaming_batches_become_row_groups() {
        let dir = tempfile::tempdir().unwrap();
        let options = WriterOptions {
            compression: "zstd".to_string(),
            ..WriterOptions::default()
        };
        let mut writer =
            ParquetStreamingWriter::new(dir.path(), "e", &options).expect("construct");
        writer.initialize_main_table().expect("init");
        writer
            .write_main_records(&[row(json!({"n": "1"})), row(json!({"n": "2"}))])
            .expect("first batch");
        writer
            .write_main_records(&[row(json!({"n": "3", "late": "x"}))])
            .expect("second batch");
        writer.finalize().expect("finalize");

        let (columns, count) = read_back(&dir.path().join("e.parquet"));
        assert_eq!(vec!["n"], columns);
        assert_eq!(3, count);
    }
}
