use serde::Deserialize;

use crate::Config;
use crate::shared::{DestinationConfig, MetricsConfig, SourceConfig, ValidationError};

/// Complete configuration of one exporter run.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    /// Optional Prometheus exporter. Metrics are only recorded when present.
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.destination.validate()
    }
}

impl Config for ExporterConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] =
        &["source.tables", "destination.elasticsearch.denylist"];
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;
    use std::fs;

    use super::*;
    use crate::Environment;
    use crate::load::load_config_from;
    use crate::shared::{ElasticsearchConfig, WatermarkConfig};

    const ARCHIVE_CONFIG: &str = r#"
source:
  connection:
    host: localhost
    name: feed_archiver
    username: feed_archiver
    password: feed_archiver
  tables: [chan_8kun2_post]
destination:
  archive:
    path: out_mp.ndjson.zst
"#;

    const INDEX_CONFIG: &str = r#"{
        "source": {
            "connection": {
                "host": "db",
                "port": 6432,
                "name": "feed_archiver",
                "username": "feed_archiver",
                "tls": { "enabled": false }
            },
            "tables": ["chan_4chan_post", "chan_4chan_thread"],
            "watermark": 1600000000,
            "fetch_size": 1000
        },
        "destination": {
            "elasticsearch": {
                "url": "http://localhost:9200",
                "index": "feed_archiver",
                "batch_size": 500
            }
        },
        "metrics": { "listen_address": "127.0.0.1:9000" }
    }"#;

    #[test]
    fn archive_config_uses_defaults() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(directory.path().join("base.yaml"), ARCHIVE_CONFIG).unwrap();

        let config: ExporterConfig = load_config_from(directory.path(), Environment::Dev).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.connection.port, 5432);
        assert_eq!(
            config
                .source
                .connection
                .password
                .as_ref()
                .unwrap()
                .expose_secret(),
            "feed_archiver"
        );
        assert_eq!(config.source.fetch_size, SourceConfig::DEFAULT_FETCH_SIZE);
        assert_eq!(config.source.watermark, None);
        assert!(config.metrics.is_none());

        let DestinationConfig::Archive(archive) = config.destination else {
            panic!("expected an archive destination");
        };
        assert_eq!(archive.path.to_str(), Some("out_mp.ndjson.zst"));
        assert_eq!(archive.compression_level, 19);
        assert_eq!(archive.workers, None);
    }

    #[test]
    fn environment_file_overrides_base() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(directory.path().join("base.yaml"), ARCHIVE_CONFIG).unwrap();
        fs::write(
            directory.path().join("prod.yaml"),
            "source:\n  fetch_size: 250\n  watermark: 42\n",
        )
        .unwrap();

        let config: ExporterConfig =
            load_config_from(directory.path(), Environment::Prod).unwrap();

        assert_eq!(config.source.fetch_size, 250);
        assert_eq!(config.source.watermark, Some(WatermarkConfig::EpochSeconds(42)));
        assert_eq!(config.source.tables, vec!["chan_8kun2_post".to_string()]);
    }

    #[test]
    fn index_config_uses_denylist_defaults() {
        let config: ExporterConfig = serde_json::from_str(INDEX_CONFIG).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.tables.len(), 2);
        assert_eq!(
            config.source.watermark,
            Some(WatermarkConfig::EpochSeconds(1_600_000_000))
        );
        assert_eq!(
            config.metrics.unwrap().listen_address.to_string(),
            "127.0.0.1:9000"
        );

        let DestinationConfig::Elasticsearch(elasticsearch) = config.destination else {
            panic!("expected an elasticsearch destination");
        };
        assert_eq!(elasticsearch.batch_size, 500);
        assert!(elasticsearch.refresh);
        assert_eq!(elasticsearch.denylist, vec!["_chan", "_urls"]);
        assert_eq!(
            elasticsearch.timeout_secs,
            ElasticsearchConfig::DEFAULT_TIMEOUT_SECS
        );
    }

    #[test]
    fn validation_rejects_zero_sizes() {
        let mut config: ExporterConfig = serde_json::from_str(INDEX_CONFIG).unwrap();
        config.source.fetch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { field, .. }) if field == "source.fetch_size"
        ));

        let mut config: ExporterConfig = serde_json::from_str(INDEX_CONFIG).unwrap();
        if let DestinationConfig::Elasticsearch(elasticsearch) = &mut config.destination {
            elasticsearch.batch_size = 0;
        }
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { field, .. })
                if field == "destination.elasticsearch.batch_size"
        ));

        let mut config: ExporterConfig = serde_json::from_str(INDEX_CONFIG).unwrap();
        config.source.tables.clear();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::NoSourceTables)
        ));
    }

    #[test]
    fn watermark_accepts_sub_second_timestamps() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(directory.path().join("base.yaml"), ARCHIVE_CONFIG).unwrap();
        fs::write(
            directory.path().join("prod.yaml"),
            "source:\n  watermark: \"1970-01-01T00:05:00.700000Z\"\n",
        )
        .unwrap();

        let config: ExporterConfig =
            load_config_from(directory.path(), Environment::Prod).unwrap();

        let Some(WatermarkConfig::Timestamp(watermark)) = config.source.watermark else {
            panic!("expected a timestamp watermark");
        };
        assert_eq!(watermark.timestamp_micros(), 300_700_000);
    }

    #[test]
    fn missing_base_file_is_reported() {
        let directory = tempfile::tempdir().unwrap();

        let err = load_config_from::<ExporterConfig>(directory.path(), Environment::Dev)
            .unwrap_err();

        assert!(matches!(
            err,
            crate::LoadConfigError::ConfigurationFileMissing { .. }
        ));
    }
}
