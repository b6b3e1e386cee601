//! Output writers: the streaming and one-shot contracts, and the codec
//! registry that maps format names to constructors.

pub mod csv;
pub mod jsonl;
#[cfg(feature = "parquet")]
pub mod parquet;

use crate::Row;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::IntoEnumIterator;

/// Error type returned by all writer operations.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode row: {0}")]
    Encode(String),

    #[error("failed to write csv: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("unsupported output format: '{0}', supported: {1}")]
    UnsupportedFormat(String, String),

    #[error("{format} support requires the '{feature}' feature")]
    MissingDependency {
        format: &'static str,
        feature: &'static str,
    },
}

/// Output formats with built-in writers. Additional formats plug in by
/// implementing the writer traits directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::EnumIter)]
pub enum OutputFormat {
    Csv,
    Jsonl,
    Parquet,
}

impl OutputFormat {
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Parquet => "parquet",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.name()
    }

    /// Whether the codec is compiled in. Requesting an unavailable codec
    /// is an error at writer construction, never a silent fallback.
    pub fn is_available(&self) -> bool {
        match self {
            OutputFormat::Csv | OutputFormat::Jsonl => true,
            OutputFormat::Parquet => cfg!(feature = "parquet"),
        }
    }

    fn supported_list() -> String {
        OutputFormat::iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<OutputFormat, OutputError> {
        let lower = s.to_ascii_lowercase();
        OutputFormat::iter()
            .find(|f| f.name() == lower)
            .ok_or_else(|| {
                OutputError::UnsupportedFormat(s.to_string(), OutputFormat::supported_list())
            })
    }
}

/// Per-codec knobs forwarded by `save` and the streaming pump. Codecs read
/// what applies to them and ignore the rest.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// CSV column delimiter.
    pub delimiter: u8,
    /// CSV stand-in for null values.
    pub null_string: String,
    /// Whether CSV output starts with a header row.
    pub include_header: bool,
    /// Parquet compression codec: none, snappy, gzip, zstd, or lz4.
    pub compression: String,
    /// Parquet row-group size hint, in rows.
    pub row_group_size: usize,
}

impl Default for WriterOptions {
    fn default() -> WriterOptions {
        WriterOptions {
            delimiter: b',',
            null_string: String::new(),
            include_header: true,
            compression: "snappy".to_string(),
            row_group_size: 10_000,
        }
    }
}

/// One-shot writer: encodes a complete table to one file.
pub trait TableWriter {
    fn write_table(&self, rows: &[Row], path: &Path) -> Result<(), OutputError>;
}

/// Row-at-a-time writer producing one file per table under a base
/// directory. Table state opens lazily on first write; initialization is
/// idempotent per table, and `finalize` commits whatever is buffered.
pub trait StreamingWriter {
    fn initialize_main_table(&mut self) -> Result<(), OutputError>;

    fn initialize_child_table(&mut self, name: &str) -> Result<(), OutputError>;

    fn write_main_records(&mut self, rows: &[Row]) -> Result<(), OutputError>;

    fn write_child_records(&mut self, name: &str, rows: &[Row]) -> Result<(), OutputError>;

    /// Commits buffered state and closes every table. Idempotent.
    fn finalize(&mut self) -> Result<(), OutputError>;
}

struct Codec {
    format: OutputFormat,
    feature: &'static str,
    one_shot: fn(&WriterOptions) -> Result<Box<dyn TableWriter>, OutputError>,
    streaming:
        fn(&Path, &str, &WriterOptions) -> Result<Box<dyn StreamingWriter>, OutputError>,
}

fn unavailable(format: &'static str, feature: &'static str) -> OutputError {
    OutputError::MissingDependency { format, feature }
}

fn csv_one_shot(options: &WriterOptions) -> Result<Box<dyn TableWriter>, OutputError> {
    Ok(Box::new(csv::CsvWriter::new(options)))
}

fn csv_streaming(
    base: &Path,
    entity: &str,
    options: &WriterOptions,
) -> Result<Box<dyn StreamingWriter>, OutputError> {
    Ok(Box::new(csv::CsvStreamingWriter::new(base, entity, options)))
}

fn jsonl_one_shot(options: &WriterOptions) -> Result<Box<dyn TableWriter>, OutputError> {
    Ok(Box::new(jsonl::JsonlWriter::new(options)))
}

fn jsonl_streaming(
    base: &Path,
    entity: &str,
    options: &WriterOptions,
) -> Result<Box<dyn StreamingWriter>, OutputError> {
    Ok(Box::new(jsonl::JsonlStreamingWriter::new(
        base, entity, options,
    )))
}

#[cfg(feature = "parquet")]
fn parquet_one_shot(options: &WriterOptions) -> Result<Box<dyn TableWriter>, OutputError> {
    Ok(Box::new(parquet::ParquetWriter::new(options)?))
}

#[cfg(not(feature = "parquet"))]
fn parquet_one_shot(_options: &WriterOptions) -> Result<Box<dyn TableWriter>, OutputError> {
    Err(unavailable("parquet", "parquet"))
}

#[cfg(feature = "parquet")]
fn parquet_streaming(
    base: &Path,
    entity: &str,
    options: &WriterOptions,
) -> Result<Box<dyn StreamingWriter>, OutputError> {
    Ok(Box::new(parquet::ParquetStreamingWriter::new(
        base, entity, options,
    )?))
}

#[cfg(not(feature = "parquet"))]
fn parquet_streaming(
    _base: &Path,
    _entity: &str,
    _options: &WriterOptions,
) -> Result<Box<dyn StreamingWriter>, OutputError> {
    Err(unavailable("parquet", "parquet"))
}

const CODECS: &[Codec] = &[
    Codec {
        format: OutputFormat::Csv,
        feature: "",
        one_shot: csv_one_shot,
        streaming: csv_streaming,
    },
    Codec {
        format: OutputFormat::Jsonl,
        feature: "",
        one_shot: jsonl_one_shot,
        streaming: jsonl_streaming,
    },
    Codec {
        format: OutputFormat::Parquet,
        feature: "parquet",
        one_shot: parquet_one_shot,
        streaming: parquet_streaming,
    },
];

fn codec_for(format: OutputFormat) -> Result<&'static Codec, OutputError> {
    let codec = CODECS
        .iter()
        .find(|c| c.format == format)
        .expect("every format has a codec entry");
    if !format.is_available() {
        return Err(unavailable(format.name(), codec.feature));
    }
    Ok(codec)
}

/// Creates a one-shot writer for `format`.
pub fn create_writer(
    format: OutputFormat,
    options: &WriterOptions,
) -> Result<Box<dyn TableWriter>, OutputError> {
    (codec_for(format)?.one_shot)(options)
}

/// Creates a streaming writer producing files under `base` with the main
/// table named for `entity`.
pub fn create_streaming_writer(
    format: OutputFormat,
    base: &Path,
    entity: &str,
    options: &WriterOptions,
) -> Result<Box<dyn StreamingWriter>, OutputError> {
    (codec_for(format)?.streaming)(base, entity, options)
}

/// File path for a table under `base`: the entity name for the main table,
/// the sanitized table name otherwise.
pub(crate) fn table_path(base: &Path, table: &str, format: OutputFormat) -> PathBuf {
    let file = crate::naming::sanitize_filename(table);
    base.join(format!("{file}.{}", format.extension()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!(OutputFormat::Csv, "CSV".parse().unwrap());
        assert_eq!(OutputFormat::Jsonl, "jsonl".parse().unwrap());
        assert_eq!(OutputFormat::Parquet, "parquet".parse().unwrap());
    }

    #[test]
    fn unknown_formats_list_the_supported_set() {
        let err = "orc".parse::<OutputFormat>().expect_err("unknown format");
        let message = err.to_string();
        assert!(message.contains("orc"));
        assert!(message.contains("csv"));
        assert!(message.contains("parquet"));
    }

    #[test]
    fn builtin_writers_construct() {
        let options = WriterOptions::default();
        create_writer(OutputFormat::Csv, &options).expect("csv");
        create_writer(OutputFormat::Jsonl, &options).expect("jsonl");
        #[cfg(feature = "parquet")]
        create_writer(OutputFormat::Parquet, &options).expect("parquet");
    }

    #[test]
    fn table_paths_are_filename_safe() {
        let path = table_path(Path::new("/out"), "e/items", OutputFormat::Csv);
        assert_eq!(Path::new("/out/e_items.csv"), path);
    }
}
