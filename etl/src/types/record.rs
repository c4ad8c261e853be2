use chrono::{DateTime, Utc};
use serde_json::Value;

/// A single archived row as read from the source table.
///
/// `payload` is the raw `data` column. Sinks require it to be a JSON object, but that is
/// checked by the transformers and not here.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: i64,
    pub archived_on: Option<DateTime<Utc>>,
    pub payload: Value,
}

impl Record {
    pub fn new(id: i64, archived_on: Option<DateTime<Utc>>, payload: Value) -> Self {
        Self {
            id,
            archived_on,
            payload,
        }
    }

    /// Returns `archived_on` as whole seconds since the Unix epoch, rounded down.
    pub fn archived_on_epoch_seconds(&self) -> Option<i64> {
        self.archived_on.map(|archived_on| archived_on.timestamp())
    }
}
