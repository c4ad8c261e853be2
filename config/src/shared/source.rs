use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Where the exporter reads archived records from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    pub connection: PgConnectionConfig,
    /// Tables exported in order within one run.
    pub tables: Vec<String>,
    /// Only rows whose `archived_on` is strictly later than this point are exported. When
    /// absent the whole table is exported.
    #[serde(default)]
    pub watermark: Option<WatermarkConfig>,
    /// Number of rows requested from the server side cursor per round trip.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    /// Number of rows between two progress log events.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

/// Starting point of an incremental run.
///
/// Accepts whole seconds since the Unix epoch (`1600000000`) or an RFC 3339 timestamp
/// (`2020-09-13T12:26:40.250000Z`). The timestamp form keeps sub-second precision, which is
/// what a previous run reports as its next watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WatermarkConfig {
    EpochSeconds(i64),
    Timestamp(DateTime<Utc>),
}

impl SourceConfig {
    pub const DEFAULT_FETCH_SIZE: usize = 5000;

    pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection.validate()?;

        if self.tables.iter().all(|table| table.trim().is_empty()) {
            return Err(ValidationError::NoSourceTables);
        }

        if self.fetch_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "source.fetch_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.progress_interval == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "source.progress_interval".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_fetch_size() -> usize {
    SourceConfig::DEFAULT_FETCH_SIZE
}

fn default_progress_interval() -> u64 {
    SourceConfig::DEFAULT_PROGRESS_INTERVAL
}
