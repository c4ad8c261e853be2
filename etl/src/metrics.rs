//! Metric names recorded by export runs.
//!
//! Metrics are emitted through the [`metrics`] facade and are dropped unless the binary
//! installs a recorder.

/// Label for the exported table.
pub const TABLE_NAME_LABEL: &str = "table_name";

/// Label for the destination kind, see [`crate::destination::Destination::name`].
pub const DESTINATION_LABEL: &str = "destination";

/// Counter for rows fetched from the source cursor.
pub const ETL_ROWS_READ_TOTAL: &str = "etl_rows_read_total";

/// Counter for rows dropped by a transformer without producing a document.
pub const ETL_RECORDS_SKIPPED_TOTAL: &str = "etl_records_skipped_total";

/// Counter for documents handed to the destination.
pub const ETL_DOCUMENTS_WRITTEN_TOTAL: &str = "etl_documents_written_total";

/// Histogram for the time spent writing one chunk of documents.
pub const ETL_CHUNK_WRITE_DURATION_SECONDS: &str = "etl_chunk_write_duration_seconds";

/// Histogram for the time spent exporting one table.
pub const ETL_TABLE_EXPORT_DURATION_SECONDS: &str = "etl_table_export_duration_seconds";

/// Counter for `_bulk` requests sent to the index.
pub const ETL_BULK_REQUESTS_TOTAL: &str = "etl_bulk_requests_total";

/// Histogram for the duration of one `_bulk` request.
pub const ETL_BULK_REQUEST_DURATION_SECONDS: &str = "etl_bulk_request_duration_seconds";

/// Counter for bulk items the index reported as failed.
pub const ETL_BULK_ITEM_FAILURES_TOTAL: &str = "etl_bulk_item_failures_total";
