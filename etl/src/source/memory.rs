use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::{RowCursor, RowSource};
use crate::types::{Record, TableName, Watermark};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableName, Vec<Record>>,
    closed_cursors: usize,
    aborted_cursors: usize,
}

/// In-memory source for tests and local experiments.
///
/// Tables hold records in the order they are returned. Watermark filtering and chunking
/// behave like [`crate::source::postgres::PgSource`].
#[derive(Debug, Clone)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
    fetch_size: usize,
}

impl MemorySource {
    pub fn new(fetch_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            fetch_size: fetch_size.max(1),
        }
    }

    /// Replaces the records of `table`.
    pub async fn insert_table(&self, table: TableName, records: Vec<Record>) {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(table, records);
    }

    /// Appends records to `table`, creating it when missing.
    pub async fn append_records(&self, table: &TableName, records: Vec<Record>) {
        let mut inner = self.inner.lock().await;
        inner
            .tables
            .entry(table.clone())
            .or_default()
            .extend(records);
    }

    /// Number of cursors released through [`RowCursor::close`].
    pub async fn closed_cursors(&self) -> usize {
        self.inner.lock().await.closed_cursors
    }

    /// Number of cursors released through [`RowCursor::abort`].
    pub async fn aborted_cursors(&self) -> usize {
        self.inner.lock().await.aborted_cursors
    }
}

impl RowSource for MemorySource {
    type Cursor = MemoryCursor;

    async fn open(
        &self,
        table: &TableName,
        watermark: Option<Watermark>,
    ) -> EtlResult<(u64, Self::Cursor)> {
        let inner = self.inner.lock().await;

        let Some(records) = inner.tables.get(table) else {
            return Err(etl_error!(
                ErrorKind::SourceSchemaError,
                "Archive table does not exist",
                format!("table {table} was not found")
            ));
        };

        let records: Vec<Record> = records
            .iter()
            .filter(|record| watermark.is_none_or(|watermark| watermark.admits(record.archived_on)))
            .cloned()
            .collect();

        let estimated_rows = records.len() as u64;
        let cursor = MemoryCursor {
            source: self.inner.clone(),
            records: records.into_iter(),
            fetch_size: self.fetch_size,
        };

        Ok((estimated_rows, cursor))
    }
}

#[derive(Debug)]
pub struct MemoryCursor {
    source: Arc<Mutex<Inner>>,
    records: std::vec::IntoIter<Record>,
    fetch_size: usize,
}

impl RowCursor for MemoryCursor {
    async fn next_chunk(&mut self) -> EtlResult<Option<Vec<Record>>> {
        let chunk: Vec<Record> = self.records.by_ref().take(self.fetch_size).collect();
        if chunk.is_empty() {
            return Ok(None);
        }

        Ok(Some(chunk))
    }

    async fn close(self) -> EtlResult<()> {
        self.source.lock().await.closed_cursors += 1;

        Ok(())
    }

    async fn abort(self) -> EtlResult<()> {
        self.source.lock().await.aborted_cursors += 1;

        Ok(())
    }
}
