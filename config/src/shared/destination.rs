use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;

use crate::shared::ValidationError;

/// Sink that exported records are delivered to.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking secrets.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationConfig {
    /// Zstd compressed newline delimited JSON file for cold storage.
    Archive(ArchiveConfig),
    /// Elasticsearch compatible `_bulk` endpoint.
    Elasticsearch(ElasticsearchConfig),
}

impl DestinationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            DestinationConfig::Archive(config) => config.validate(),
            DestinationConfig::Elasticsearch(config) => config.validate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArchiveConfig {
    /// Output file, truncated when it already exists.
    pub path: PathBuf,
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    /// Number of zstd worker threads. `None` uses the available parallelism and `0`
    /// compresses on the writing thread.
    #[serde(default)]
    pub workers: Option<u32>,
}

impl ArchiveConfig {
    pub const DEFAULT_COMPRESSION_LEVEL: i32 = 19;

    pub const MAX_COMPRESSION_LEVEL: i32 = 22;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.path.as_os_str().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination.archive.path".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        if !(1..=Self::MAX_COMPRESSION_LEVEL).contains(&self.compression_level) {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination.archive.compression_level".to_string(),
                constraint: format!("must be between 1 and {}", Self::MAX_COMPRESSION_LEVEL),
            });
        }

        Ok(())
    }
}

fn default_compression_level() -> i32 {
    ArchiveConfig::DEFAULT_COMPRESSION_LEVEL
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ElasticsearchConfig {
    /// Base url of the cluster, e.g. `http://localhost:9200`.
    pub url: String,
    /// Target index name.
    pub index: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Number of documents sent per `_bulk` request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Whether indexed documents are made visible to search before the bulk request returns.
    #[serde(default = "default_refresh")]
    pub refresh: bool,
    /// Top level keys removed from every document before it is indexed.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ElasticsearchConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 10_000;

    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    pub const DEFAULT_DENYLIST: &'static [&'static str] = &["_chan", "_urls"];

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination.elasticsearch.url".to_string(),
                constraint: "must start with http:// or https://".to_string(),
            });
        }

        if self.index.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination.elasticsearch.index".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        if self.batch_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination.elasticsearch.batch_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_batch_size() -> usize {
    ElasticsearchConfig::DEFAULT_BATCH_SIZE
}

fn default_refresh() -> bool {
    true
}

fn default_denylist() -> Vec<String> {
    ElasticsearchConfig::DEFAULT_DENYLIST
        .iter()
        .map(|key| key.to_string())
        .collect()
}

fn default_timeout_secs() -> u64 {
    ElasticsearchConfig::DEFAULT_TIMEOUT_SECS
}
