use crate::config::ConfigError;
use crate::output::OutputError;

/// Error type returned by all shredding operations.
///
/// Variants map one-to-one onto the failure categories surfaced to callers:
/// configuration and validation problems abort before any record is
/// processed, parse and processing problems are per-record and subject to
/// the configured recovery mode, and output problems abort the run.
#[derive(Debug, thiserror::Error)]
pub enum ShredError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("failed to parse record: {0}")]
    Parse(String),

    #[error("failed to process record: {0}")]
    Processing(String),

    #[error("failed to write output: {0}")]
    Output(#[from] OutputError),
}

impl ShredError {
    /// Whether this error stays local to a single record under
    /// skip-recovery, as opposed to aborting the whole run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ShredError::Parse(_) | ShredError::Processing(_))
    }
}
