use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// How arrays encountered during flattening are handled.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ArrayMode {
    /// Keep arrays of scalars inline in the owning row; extract arrays that
    /// contain objects or nested arrays into child tables.
    #[default]
    Smart,
    /// Extract every array into a child table, regardless of content.
    Separate,
    /// Keep every array in the owning row as a single serialized value.
    Inline,
    /// Omit arrays entirely.
    Skip,
}

/// How null and empty-string scalars are handled.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum NullHandling {
    /// Omit the column from the row.
    #[default]
    Skip,
    /// Materialize the column as an empty string.
    Include,
}

/// What happens when a single record cannot be decoded or processed.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Abort the run at the first bad record.
    #[default]
    Strict,
    /// Log the failure and continue with the next record.
    Skip,
}

/// How record identifiers are derived.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IdMode {
    /// Version-4 UUID per record.
    #[default]
    Random,
    /// Version-5 UUID over a canonical encoding of the whole record.
    /// Identical records produce identical ids across runs and hosts.
    DeterministicRecord,
    /// Version-5 UUID over a canonical encoding of the configured
    /// `idFields`, in their listed order.
    DeterministicFields,
    /// Use an identifier discovered in the record itself, looking up
    /// `idFields` then `idPatterns`; falls back to a random UUID.
    Natural,
}

/// Configures how records are shredded into tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ShredConfig {
    /// Joins path components in flattened column names and child-table
    /// names. Must be non-empty and printable.
    pub separator: String,

    /// Array handling policy. See `ArrayMode`.
    pub array_mode: ArrayMode,

    /// Null and empty-string handling. See `NullHandling`.
    pub null_handling: NullHandling,

    /// If true, every emitted scalar is stringified: booleans as lowercase
    /// `true`/`false`, numbers via their natural textual form.
    pub cast_to_string: bool,

    /// Recursion cap. Sub-trees deeper than this are truncated with a
    /// warning; the already-flattened ancestor row is still emitted.
    pub max_depth: u32,

    /// Records pulled from the input per pump iteration.
    pub batch_size: usize,

    /// Column receiving the record identifier when no natural id is found.
    pub id_field: String,

    /// Column linking a child row to the identifier of its parent row.
    pub parent_field: String,

    /// Column receiving the run timestamp. Null or empty disables
    /// timestamping.
    pub time_field: Option<String>,

    /// Identifier derivation mode. See `IdMode`.
    pub id_mode: IdMode,

    /// Ordered field list used by the `deterministic_fields` mode and as
    /// the lookup priority of the `natural` mode.
    pub id_fields: Vec<String>,

    /// Field names probed, in order, when discovering a natural id.
    pub id_patterns: Vec<String>,

    /// Malformed-record handling. See `RecoveryMode`.
    pub recovery_mode: RecoveryMode,
}

pub const DEFAULT_ID_FIELD: &str = "__shred_id";
pub const DEFAULT_PARENT_FIELD: &str = "__parent_shred_id";
pub const DEFAULT_TIME_FIELD: &str = "__shred_datetime";

fn default_id_patterns() -> Vec<String> {
    [
        "id",
        "ID",
        "_id",
        "uuid",
        "guid",
        "pk",
        "primary_key",
        "key",
        "identifier",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ShredConfig {
    fn default() -> ShredConfig {
        ShredConfig {
            separator: "_".to_string(),
            array_mode: ArrayMode::default(),
            null_handling: NullHandling::default(),
            cast_to_string: true,
            max_depth: 100,
            batch_size: 1000,
            id_field: DEFAULT_ID_FIELD.to_string(),
            parent_field: DEFAULT_PARENT_FIELD.to_string(),
            time_field: Some(DEFAULT_TIME_FIELD.to_string()),
            id_mode: IdMode::default(),
            id_fields: Vec::new(),
            id_patterns: default_id_patterns(),
            recovery_mode: RecoveryMode::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("separator must be non-empty and printable, got {0:?}")]
    InvalidSeparator(String),

    #[error("batch size must be positive")]
    InvalidBatchSize,

    #[error("max depth must be positive")]
    InvalidMaxDepth,

    #[error("metadata field names must be pairwise distinct, got duplicate {0:?}")]
    DuplicateMetadataField(String),

    #[error("id mode 'deterministic_fields' requires a non-empty idFields list")]
    MissingIdFields,
}

impl ShredConfig {
    /// Returns the generated JSON schema for the configuration file.
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(ShredConfig)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<ShredConfig, ConfigError> {
        let file = fs::File::open(path)?;
        let config: ShredConfig = serde_json::from_reader(io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants a processing run relies on. Called once at
    /// processor construction; a config that passes here cannot fail later
    /// for configuration reasons.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.separator.is_empty() || self.separator.chars().any(|c| c.is_control()) {
            return Err(ConfigError::InvalidSeparator(self.separator.clone()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth);
        }

        let mut reserved = vec![self.id_field.as_str(), self.parent_field.as_str()];
        if let Some(time_field) = self.time_field_name() {
            reserved.push(time_field);
        }
        for (i, name) in reserved.iter().enumerate() {
            if reserved[..i].contains(name) {
                return Err(ConfigError::DuplicateMetadataField(name.to_string()));
            }
        }

        if self.id_mode == IdMode::DeterministicFields && self.id_fields.is_empty() {
            return Err(ConfigError::MissingIdFields);
        }
        Ok(())
    }

    /// The configured time column, or `None` when timestamping is disabled.
    pub fn time_field_name(&self) -> Option<&str> {
        self.time_field.as_deref().filter(|f| !f.is_empty())
    }

    /// Field names probed when discovering a natural id, in priority
    /// order. Natural mode consults `id_fields` ahead of the patterns.
    pub(crate) fn discovery_patterns(&self) -> impl Iterator<Item = &str> {
        let prefix: &[String] = match self.id_mode {
            IdMode::Natural => &self.id_fields,
            _ => &[],
        };
        prefix
            .iter()
            .chain(self.id_patterns.iter())
            .map(String::as_str)
    }

    // Builder-style helpers.

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_array_mode(mut self, array_mode: ArrayMode) -> Self {
        self.array_mode = array_mode;
        self
    }

    pub fn with_null_handling(mut self, null_handling: NullHandling) -> Self {
        self.null_handling = null_handling;
        self
    }

    pub fn with_cast_to_string(mut self, cast_to_string: bool) -> Self {
        self.cast_to_string = cast_to_string;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_recovery_mode(mut self, recovery_mode: RecoveryMode) -> Self {
        self.recovery_mode = recovery_mode;
        self
    }

    pub fn with_time_field(mut self, time_field: Option<String>) -> Self {
        self.time_field = time_field;
        self
    }

    /// Deterministic ids derived from `fields`, in the given order.
    pub fn with_deterministic_ids(
        mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.id_mode = IdMode::DeterministicFields;
        self.id_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Natural-id discovery, optionally overriding the probe patterns.
    pub fn with_natural_ids(mut self, patterns: Option<Vec<String>>) -> Self {
        self.id_mode = IdMode::Natural;
        if let Some(patterns) = patterns {
            self.id_patterns = patterns;
        }
        self
    }

    /// A configuration that skips bad records instead of aborting.
    pub fn error_tolerant() -> ShredConfig {
        ShredConfig::default().with_recovery_mode(RecoveryMode::Skip)
    }

    /// A configuration suited to CSV output: every value stringified, nulls
    /// materialized as empty strings so columns stay rectangular.
    pub fn csv_optimized() -> ShredConfig {
        ShredConfig::default()
            .with_cast_to_string(true)
            .with_null_handling(NullHandling::Include)
    }

    /// A configuration suited to JSON-family output: native types
    /// preserved, nulls kept.
    pub fn json_optimized() -> ShredConfig {
        ShredConfig::default()
            .with_cast_to_string(false)
            .with_null_handling(NullHandling::Include)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config_is_valid() {
        ShredConfig::default().validate().expect("default config");
    }

    #[test]
    fn config_is_deserialized_with_defaults() {
        let config: ShredConfig = serde_json::from_value(json!({
            "separator": ".",
            "arrayMode": "separate",
            "recoveryMode": "skip",
        }))
        .expect("deserialize config");

        assert_eq!(".", config.separator);
        assert_eq!(ArrayMode::Separate, config.array_mode);
        assert_eq!(RecoveryMode::Skip, config.recovery_mode);
        assert_eq!(1000, config.batch_size);
        assert_eq!(DEFAULT_ID_FIELD, config.id_field);
    }

    #[test]
    fn invalid_separator_is_rejected() {
        let empty = ShredConfig::default().with_separator("");
        assert!(matches!(
            empty.validate(),
            Err(ConfigError::InvalidSeparator(_))
        ));

        let control = ShredConfig::default().with_separator("\u{1}");
        assert!(matches!(
            control.validate(),
            Err(ConfigError::InvalidSeparator(_))
        ));
    }

    #[test]
    fn duplicate_metadata_fields_are_rejected() {
        let mut config = ShredConfig::default();
        config.parent_field = config.id_field.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateMetadataField(_))
        ));

        // A disabled time field does not participate in the check.
        let mut config = ShredConfig::default();
        config.time_field = Some(String::new());
        config.validate().expect("empty time field is disabled");
    }

    #[test]
    fn deterministic_fields_mode_requires_fields() {
        let mut config = ShredConfig::default();
        config.id_mode = IdMode::DeterministicFields;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingIdFields)
        ));

        config.id_fields = vec!["id".to_string()];
        config.validate().expect("fields provided");
    }

    #[test]
    fn zero_batch_size_and_depth_are_rejected() {
        assert!(matches!(
            ShredConfig::default().with_batch_size(0).validate(),
            Err(ConfigError::InvalidBatchSize)
        ));
        assert!(matches!(
            ShredConfig::default().with_max_depth(0).validate(),
            Err(ConfigError::InvalidMaxDepth)
        ));
    }

    #[test]
    fn natural_mode_prefers_configured_fields_over_patterns() {
        let config = ShredConfig::default()
            .with_deterministic_ids(["sku"])
            .with_natural_ids(None);
        let patterns: Vec<&str> = config.discovery_patterns().collect();
        assert_eq!("sku", patterns[0]);
        assert_eq!("id", patterns[1]);
    }

    #[test]
    fn config_schema_is_generated() {
        let schema = serde_json::to_value(ShredConfig::json_schema()).expect("schema");
        let properties = schema
            .get("properties")
            .and_then(|p| p.as_object())
            .expect("schema properties");
        assert!(properties.contains_key("separator"));
        assert!(properties.contains_key("arrayMode"));
        assert!(properties.contains_key("batchSize"));
    }
}
