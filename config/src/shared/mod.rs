//! Shared configuration types for the export pipelines.

mod connection;
mod destination;
mod exporter;
mod metrics;
mod source;
mod validation;

pub use connection::{
    ETL_EXPORT_OPTIONS, IntoConnectOptions, PgConnectionConfig, PgConnectionOptions, TlsConfig,
};
pub use destination::{ArchiveConfig, DestinationConfig, ElasticsearchConfig};
pub use exporter::ExporterConfig;
pub use metrics::MetricsConfig;
pub use source::{SourceConfig, WatermarkConfig};
pub use validation::ValidationError;
