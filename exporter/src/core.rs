use config::shared::{DestinationConfig, ExporterConfig, PgConnectionConfig, SourceConfig};
use etl::destination::Destination;
use etl::destination::archive::{ArchiveDestination, ArchiveWriterOptions};
use etl::destination::elasticsearch::{BulkIndexer, ElasticsearchClient};
use etl::error::EtlResult;
use etl::pipeline::{Pipeline, PipelineConfig, PipelineReport};
use etl::source::postgres::PgSource;
use etl::transform::{ArchiveTransformer, IndexTransformer, Transformer};
use etl::types::Watermark;
use tracing::info;

/// Runs one export with the provided configuration.
///
/// Connects to the source, builds the sink selected by the configuration and moves every
/// configured table into it. Returns the report of the finished run.
pub async fn run_export(config: ExporterConfig) -> EtlResult<PipelineReport> {
    info!("starting export");

    log_config(&config);

    let pipeline_config = PipelineConfig::from_source_config(&config.source);
    let source = PgSource::connect(&config.source.connection, config.source.fetch_size).await?;

    // Each sink pairs with its own transformer, so every branch builds a differently typed
    // pipeline.
    let report = match &config.destination {
        DestinationConfig::Archive(archive_config) => {
            let destination = ArchiveDestination::open(
                archive_config.path.clone(),
                ArchiveWriterOptions::from_config(archive_config),
            )
            .await?;

            run_pipeline(pipeline_config, source, ArchiveTransformer, destination).await?
        }
        DestinationConfig::Elasticsearch(elasticsearch_config) => {
            let client = ElasticsearchClient::new(elasticsearch_config)?;
            let destination = BulkIndexer::new(client, elasticsearch_config.batch_size);
            let transformer = IndexTransformer::new(elasticsearch_config.denylist.clone());

            run_pipeline(pipeline_config, source, transformer, destination).await?
        }
    };

    let previous = config.source.watermark.map(Watermark::from);
    info!(
        rows_read = report.rows_read(),
        documents_written = report.documents_written(),
        next_watermark = ?report.next_watermark(previous).map(|watermark| watermark.to_string()),
        "export finished"
    );

    Ok(report)
}

async fn run_pipeline<T, D>(
    config: PipelineConfig,
    source: PgSource,
    transformer: T,
    destination: D,
) -> EtlResult<PipelineReport>
where
    T: Transformer<Document = D::Document>,
    D: Destination,
{
    Pipeline::new(config, source, transformer, destination)
        .run()
        .await
}

fn log_config(config: &ExporterConfig) {
    log_source_config(&config.source);
    log_destination_config(&config.destination);
}

fn log_source_config(config: &SourceConfig) {
    log_pg_connection_config(&config.connection);
    info!(
        tables = ?config.tables,
        watermark = ?config.watermark,
        fetch_size = config.fetch_size,
        progress_interval = config.progress_interval,
        "source config"
    );
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    info!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "source postgres connection config",
    );
}

fn log_destination_config(config: &DestinationConfig) {
    match config {
        DestinationConfig::Archive(archive_config) => {
            info!(
                path = %archive_config.path.display(),
                compression_level = archive_config.compression_level,
                workers = ?archive_config.workers,
                "using archive destination config"
            );
        }
        DestinationConfig::Elasticsearch(elasticsearch_config) => {
            info!(
                url = elasticsearch_config.url,
                index = elasticsearch_config.index,
                username = ?elasticsearch_config.username,
                batch_size = elasticsearch_config.batch_size,
                refresh = elasticsearch_config.refresh,
                denylist = ?elasticsearch_config.denylist,
                "using elasticsearch destination config"
            );
        }
    }
}
