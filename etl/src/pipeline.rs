use chrono::{DateTime, Utc};
use config::shared::SourceConfig;
use metrics::{counter, histogram};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::destination::Destination;
use crate::error::EtlResult;
use crate::metrics::{
    DESTINATION_LABEL, ETL_CHUNK_WRITE_DURATION_SECONDS, ETL_DOCUMENTS_WRITTEN_TOTAL,
    ETL_RECORDS_SKIPPED_TOTAL, ETL_ROWS_READ_TOTAL, ETL_TABLE_EXPORT_DURATION_SECONDS,
    TABLE_NAME_LABEL,
};
use crate::source::{RowCursor, RowSource};
use crate::transform::Transformer;
use crate::types::{Record, TableName, Watermark};

/// What one run exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Tables exported one after the other, in this order.
    pub tables: Vec<TableName>,
    /// Restricts every table to rows archived after this point. `None` exports everything.
    pub watermark: Option<Watermark>,
    /// Number of rows between two progress log events.
    pub progress_interval: u64,
}

impl PipelineConfig {
    pub fn from_source_config(config: &SourceConfig) -> Self {
        Self {
            tables: config
                .tables
                .iter()
                .filter(|table| !table.trim().is_empty())
                .map(|table| TableName::parse(table))
                .collect(),
            watermark: config.watermark.map(Watermark::from),
            progress_interval: config.progress_interval,
        }
    }
}

/// Outcome of exporting one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: TableName,
    /// Row count reported by the source when the table was opened.
    pub estimated_rows: u64,
    pub rows_read: u64,
    pub documents_written: u64,
    /// Latest `archived_on` among the rows read, rejected rows included.
    pub max_archived_on: Option<DateTime<Utc>>,
}

impl TableReport {
    fn new(table: TableName, estimated_rows: u64) -> Self {
        Self {
            table,
            estimated_rows,
            rows_read: 0,
            documents_written: 0,
            max_archived_on: None,
        }
    }

    /// Rows that were read but produced no document.
    pub fn rows_skipped(&self) -> u64 {
        self.rows_read.saturating_sub(self.documents_written)
    }

    fn observe(&mut self, record: &Record) {
        self.rows_read += 1;
        if record.archived_on > self.max_archived_on {
            self.max_archived_on = record.archived_on;
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub tables: Vec<TableReport>,
}

impl PipelineReport {
    pub fn rows_read(&self) -> u64 {
        self.tables.iter().map(|table| table.rows_read).sum()
    }

    pub fn documents_written(&self) -> u64 {
        self.tables.iter().map(|table| table.documents_written).sum()
    }

    pub fn max_archived_on(&self) -> Option<DateTime<Utc>> {
        self.tables
            .iter()
            .filter_map(|table| table.max_archived_on)
            .max()
    }

    /// Returns the watermark for the next incremental run.
    ///
    /// This is the latest `archived_on` seen at full precision, or `previous` when the run
    /// read nothing newer.
    pub fn next_watermark(&self, previous: Option<Watermark>) -> Option<Watermark> {
        let seen = self.max_archived_on().map(Watermark::from_datetime);

        seen.max(previous)
    }
}

/// Context of a single export run: where rows come from, how they are reshaped and where the
/// documents go.
///
/// The pipeline is consumed by [`Pipeline::run`]. On failure the open cursor is rolled back and
/// the destination is aborted before the error is returned.
#[derive(Debug)]
pub struct Pipeline<S, T, D> {
    config: PipelineConfig,
    source: S,
    transformer: T,
    destination: D,
}

impl<S, T, D> Pipeline<S, T, D>
where
    S: RowSource,
    T: Transformer<Document = D::Document>,
    D: Destination,
{
    pub fn new(config: PipelineConfig, source: S, transformer: T, destination: D) -> Self {
        Self {
            config,
            source,
            transformer,
            destination,
        }
    }

    pub async fn run(self) -> EtlResult<PipelineReport> {
        let Pipeline {
            config,
            source,
            transformer,
            mut destination,
        } = self;

        info!(
            tables = config.tables.len(),
            watermark = ?config.watermark.map(|watermark| watermark.to_string()),
            destination = D::name(),
            "starting export run"
        );

        let mut report = PipelineReport::default();
        for table in &config.tables {
            match export_table(&config, &source, &transformer, &mut destination, table).await {
                Ok(table_report) => report.tables.push(table_report),
                Err(err) => {
                    error!(%table, error = %err, "export run failed");
                    destination.abort().await;

                    return Err(err);
                }
            }
        }

        destination.close().await?;

        info!(
            rows_read = report.rows_read(),
            documents_written = report.documents_written(),
            max_archived_on = ?report.max_archived_on(),
            "export run finished"
        );

        Ok(report)
    }
}

async fn export_table<S, T, D>(
    config: &PipelineConfig,
    source: &S,
    transformer: &T,
    destination: &mut D,
    table: &TableName,
) -> EtlResult<TableReport>
where
    S: RowSource,
    T: Transformer<Document = D::Document>,
    D: Destination,
{
    let before_export = Instant::now();

    let (estimated_rows, mut cursor) = source.open(table, config.watermark).await?;
    info!(%table, estimated_rows, "exporting table");

    let mut report = TableReport::new(table.clone(), estimated_rows);
    let result = copy_rows(
        &mut cursor,
        transformer,
        destination,
        &mut report,
        config.progress_interval,
    )
    .await;

    match result {
        Ok(()) => cursor.close().await?,
        Err(err) => {
            if let Err(abort_err) = cursor.abort().await {
                warn!(%table, error = %abort_err, "failed to release the source cursor");
            }

            return Err(err);
        }
    }

    let export_duration_secs = before_export.elapsed().as_secs_f64();
    histogram!(
        ETL_TABLE_EXPORT_DURATION_SECONDS,
        TABLE_NAME_LABEL => table.to_string(),
        DESTINATION_LABEL => D::name(),
    )
    .record(export_duration_secs);

    info!(
        %table,
        rows_read = report.rows_read,
        documents_written = report.documents_written,
        rows_skipped = report.rows_skipped(),
        export_duration_secs,
        "finished exporting table"
    );

    Ok(report)
}

/// Moves every chunk of `cursor` through `transformer` into `destination`.
///
/// When a record fails to transform, the documents produced before it in the same chunk are
/// still written so the destination holds every record up to the failing one.
async fn copy_rows<C, T, D>(
    cursor: &mut C,
    transformer: &T,
    destination: &mut D,
    report: &mut TableReport,
    progress_interval: u64,
) -> EtlResult<()>
where
    C: RowCursor,
    T: Transformer<Document = D::Document>,
    D: Destination,
{
    let progress_interval = progress_interval.max(1);
    let table_label = report.table.to_string();

    while let Some(records) = cursor.next_chunk().await? {
        let rows_before = report.rows_read;

        let mut documents = Vec::with_capacity(records.len());
        let mut failure = None;
        for record in records {
            report.observe(&record);

            match transformer.transform(record) {
                Ok(Some(document)) => documents.push(document),
                Ok(None) => {}
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let rows_read = report.rows_read - rows_before;
        let documents_count = documents.len() as u64;
        counter!(ETL_ROWS_READ_TOTAL, TABLE_NAME_LABEL => table_label.clone()).increment(rows_read);

        if !documents.is_empty() {
            let before_writing = Instant::now();
            destination.write_documents(documents).await?;

            report.documents_written += documents_count;
            counter!(
                ETL_DOCUMENTS_WRITTEN_TOTAL,
                TABLE_NAME_LABEL => table_label.clone(),
                DESTINATION_LABEL => D::name(),
            )
            .increment(documents_count);
            histogram!(
                ETL_CHUNK_WRITE_DURATION_SECONDS,
                DESTINATION_LABEL => D::name(),
            )
            .record(before_writing.elapsed().as_secs_f64());
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let skipped = rows_read - documents_count;
        if skipped > 0 {
            counter!(ETL_RECORDS_SKIPPED_TOTAL, TABLE_NAME_LABEL => table_label.clone())
                .increment(skipped);
        }

        if report.rows_read / progress_interval > rows_before / progress_interval {
            log_progress(report);
        }
    }

    Ok(())
}

fn log_progress(report: &TableReport) {
    if report.estimated_rows > 0 {
        let percent = report.rows_read as f64 * 100.0 / report.estimated_rows as f64;
        info!(
            table = %report.table,
            rows_read = report.rows_read,
            estimated_rows = report.estimated_rows,
            "export progress {percent:.1}%"
        );
    } else {
        info!(
            table = %report.table,
            rows_read = report.rows_read,
            "export progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(seconds, 0).single()
    }

    fn table_report(name: &str, max_archived_on: Option<DateTime<Utc>>) -> TableReport {
        TableReport {
            table: TableName::parse(name),
            estimated_rows: 0,
            rows_read: 2,
            documents_written: 1,
            max_archived_on,
        }
    }

    #[test]
    fn next_watermark_takes_the_latest_timestamp() {
        let report = PipelineReport {
            tables: vec![table_report("a", at(300)), table_report("b", at(250))],
        };

        assert_eq!(report.rows_read(), 4);
        assert_eq!(report.documents_written(), 2);
        assert_eq!(report.tables[0].rows_skipped(), 1);
        assert_eq!(
            report.next_watermark(None),
            Some(Watermark::from_epoch_seconds(300))
        );
        assert_eq!(
            report.next_watermark(Some(Watermark::from_epoch_seconds(500))),
            Some(Watermark::from_epoch_seconds(500))
        );
    }

    #[test]
    fn empty_run_keeps_the_previous_watermark() {
        let report = PipelineReport {
            tables: vec![table_report("a", None)],
        };

        assert_eq!(report.next_watermark(None), None);
        assert_eq!(
            report.next_watermark(Some(Watermark::from_epoch_seconds(42))),
            Some(Watermark::from_epoch_seconds(42))
        );
    }

    #[test]
    fn config_parses_table_names() {
        let source: SourceConfig = serde_json::from_value(serde_json::json!({
            "connection": {"host": "localhost", "name": "db", "username": "user"},
            "tables": ["public.posts", "threads", " "],
            "watermark": 7
        }))
        .unwrap();

        let config = PipelineConfig::from_source_config(&source);

        assert_eq!(
            config.tables,
            vec![TableName::parse("public.posts"), TableName::parse("threads")]
        );
        assert_eq!(config.watermark, Some(Watermark::from_epoch_seconds(7)));
        assert_eq!(
            config.progress_interval,
            SourceConfig::DEFAULT_PROGRESS_INTERVAL
        );
    }
}
