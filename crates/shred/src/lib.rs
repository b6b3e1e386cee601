mod config;
mod context;
mod error;
mod extract;
mod flatten;
mod hierarchy;
mod identity;
mod input;
mod metadata;
mod naming;
mod output;
mod process;
mod result;

pub use self::config::{
    ArrayMode, ConfigError, IdMode, NullHandling, RecoveryMode, ShredConfig,
    DEFAULT_ID_FIELD, DEFAULT_PARENT_FIELD, DEFAULT_TIME_FIELD,
};
pub use self::context::ProcessingContext;
pub use self::error::ShredError;
pub use self::extract::{extract_arrays, ChildRows};
pub use self::flatten::flatten_record;
pub use self::hierarchy::{process_batch, process_record, process_record_stream};
pub use self::input::{record_iterator, DataSource, RecordIter};
pub use self::naming::{dedupe_headers, sanitize, sanitize_header};
pub use self::output::{
    create_streaming_writer, create_writer, OutputError, OutputFormat, StreamingWriter,
    TableWriter, WriterOptions,
};
pub use self::process::Shredder;
pub use self::result::ShredResult;

/// A single output row: sanitized column name to scalar value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A single input record.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Flatten `data` under the default configuration.
///
/// This is the one-call entry point. Construct a [`Shredder`] directly to
/// control the configuration or to stream output to files.
pub fn flatten(
    data: impl Into<DataSource>,
    entity: &str,
) -> Result<ShredResult, ShredError> {
    Shredder::new(ShredConfig::default())?.flatten(data, entity)
}
