//! The batch pump: pulls records, drives the hierarchy driver, and routes
//! output to the result container or a streaming writer.

use crate::config::{ConfigError, RecoveryMode, ShredConfig};
use crate::context::ProcessingContext;
use crate::error::ShredError;
use crate::hierarchy::{process_batch, process_record_stream};
use crate::input::{record_iterator, DataSource};
use crate::metadata::current_timestamp;
use crate::output::{create_streaming_writer, OutputFormat, StreamingWriter, WriterOptions};
use crate::result::ShredResult;
use crate::{Record, Row};
use std::collections::BTreeMap;
use std::path::Path;

/// Drives the full shredding pipeline over any accepted input shape.
///
/// Each run owns its context, buffers, and writer; nothing is shared
/// between runs. Peak memory is bounded by one batch of records and their
/// derived rows, plus open writer state, regardless of input size.
pub struct Shredder {
    config: ShredConfig,
}

impl Shredder {
    /// Validates `config` and builds a processor. Configuration problems
    /// surface here, before any record is touched.
    pub fn new(config: ShredConfig) -> Result<Shredder, ConfigError> {
        config.validate()?;
        Ok(Shredder { config })
    }

    pub fn config(&self) -> &ShredConfig {
        &self.config
    }

    /// Processes `data` into an in-memory [`ShredResult`].
    #[tracing::instrument(level = "debug", skip(self, data))]
    pub fn flatten(
        &self,
        data: impl Into<DataSource>,
        entity: &str,
    ) -> Result<ShredResult, ShredError> {
        let records = record_iterator(data.into())?;
        let context = ProcessingContext::new(current_timestamp());
        let mut result = ShredResult::new(entity);
        let mut record_count = 0u64;

        let mut buffer: Vec<Record> = Vec::new();
        for item in records {
            let Some(record) = self.recover(item)? else {
                continue;
            };
            buffer.push(record);
            if buffer.len() >= self.config.batch_size {
                record_count += buffer.len() as u64;
                let (rows, children) = process_batch(&buffer, entity, &self.config, &context);
                result.extend_main(rows);
                result.merge_children(children);
                buffer.clear();
            }
        }
        if !buffer.is_empty() {
            record_count += buffer.len() as u64;
            let (rows, children) = process_batch(&buffer, entity, &self.config, &context);
            result.extend_main(rows);
            result.merge_children(children);
        }

        tracing::info!(
            entity = entity,
            record_count = record_count,
            child_tables = result.tables().len(),
            "finished flattening"
        );
        Ok(result)
    }

    /// Processes `data` and streams all tables to files under `base` in the
    /// given format. The writer is finalized on success and also on
    /// failure, so files are left valid-truncated as of the last flush.
    #[tracing::instrument(level = "debug", skip(self, data, options))]
    pub fn flatten_stream(
        &self,
        data: impl Into<DataSource>,
        entity: &str,
        base: &Path,
        format: OutputFormat,
        options: &WriterOptions,
    ) -> Result<(), ShredError> {
        let mut writer = create_streaming_writer(format, base, entity, options)?;
        let outcome = self.run_stream(data.into(), entity, writer.as_mut());
        match outcome {
            Ok(()) => {
                writer.finalize()?;
                Ok(())
            }
            Err(err) => {
                // Commit whatever was flushed; the first error wins.
                if let Err(finalize_err) = writer.finalize() {
                    tracing::error!(error = %finalize_err, "finalize failed after error");
                }
                Err(err)
            }
        }
    }

    fn run_stream(
        &self,
        source: DataSource,
        entity: &str,
        writer: &mut dyn StreamingWriter,
    ) -> Result<(), ShredError> {
        let records = record_iterator(source)?;
        let context = ProcessingContext::new(current_timestamp());
        writer.initialize_main_table()?;

        let mut buffer: Vec<Record> = Vec::new();
        for item in records {
            let Some(record) = self.recover(item)? else {
                continue;
            };
            buffer.push(record);
            if buffer.len() >= self.config.batch_size {
                self.stream_batch(&buffer, entity, &context, writer)?;
                buffer.clear();
            }
        }
        if !buffer.is_empty() {
            self.stream_batch(&buffer, entity, &context, writer)?;
        }
        Ok(())
    }

    /// Processes one batch and forwards it: main rows first, then child
    /// rows grouped by table. Children are drained lazily per record, so
    /// only one batch's worth of rows is alive at a time.
    fn stream_batch(
        &self,
        batch: &[Record],
        entity: &str,
        context: &ProcessingContext,
        writer: &mut dyn StreamingWriter,
    ) -> Result<(), ShredError> {
        let mut main_rows: Vec<Row> = Vec::with_capacity(batch.len());
        let mut children: BTreeMap<String, Vec<Row>> = BTreeMap::new();

        for record in batch {
            let Some((row, child_rows)) =
                process_record_stream(record, entity, &self.config, context, None)
            else {
                continue;
            };
            main_rows.push(row);
            for (table, child_row) in child_rows {
                children.entry(table).or_default().push(child_row);
            }
        }

        writer.write_main_records(&main_rows)?;
        for (table, rows) in children {
            writer.initialize_child_table(&table)?;
            writer.write_child_records(&table, &rows)?;
        }
        Ok(())
    }

    /// Applies the recovery policy to a per-record failure. Skip-recovery
    /// only absorbs record-local errors; anything else aborts the run.
    fn recover(
        &self,
        item: Result<Record, ShredError>,
    ) -> Result<Option<Record>, ShredError> {
        match item {
            Ok(record) => Ok(Some(record)),
            Err(err)
                if err.is_recoverable()
                    && self.config.recovery_mode == RecoveryMode::Skip =>
            {
                tracing::warn!(error = %err, "skipping malformed record");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
