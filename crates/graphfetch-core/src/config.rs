//! Engine configuration.

use serde::Deserialize;

use crate::error::Error;

/// Default number of root results returned when a page carries no limit.
pub const DEFAULT_ROW_CAP: usize = 1000;

/// Default maximum rows a fold query may read before failing.
pub const DEFAULT_MAX_JOINED_ROWS: usize = 10_000;

/// Default maximum identities bound into one batched `IN` load. Stays well
/// under SQLite's 32,766 host parameter limit.
pub const DEFAULT_MAX_BATCH_KEYS: usize = 1000;

/// Query engine configuration.
///
/// Deserializable with every field optional, so hosts can load it from
/// JSON or TOML and override only what they need.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Safety ceiling applied when a page request has no limit.
    pub default_row_cap: usize,

    /// Fanout budget for eager joins through a to-many association.
    pub max_joined_rows: usize,

    /// Maximum identities per batched `IN` load. None sends one load per
    /// round regardless of size.
    pub max_batch_keys: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_row_cap: DEFAULT_ROW_CAP,
            max_joined_rows: DEFAULT_MAX_JOINED_ROWS,
            max_batch_keys: Some(DEFAULT_MAX_BATCH_KEYS),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the row cap.
    pub fn with_row_cap(mut self, cap: usize) -> Self {
        self.default_row_cap = cap;
        self
    }

    /// Set the fanout budget for fold queries.
    pub fn with_max_joined_rows(mut self, rows: usize) -> Self {
        self.max_joined_rows = rows;
        self
    }

    /// Split batched loads into chunks of at most `keys` identities.
    pub fn with_max_batch_keys(mut self, keys: usize) -> Self {
        self.max_batch_keys = Some(keys);
        self
    }

    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<(), Error> {
        if self.default_row_cap == 0 {
            return Err(Error::InvalidConfig(
                "default_row_cap must be positive".into(),
            ));
        }
        if self.max_joined_rows == 0 {
            return Err(Error::InvalidConfig(
                "max_joined_rows must be positive".into(),
            ));
        }
        if self.max_batch_keys == Some(0) {
            return Err(Error::InvalidConfig("max_batch_keys must be positive".into()));
        }
        Ok(())
    }
}
