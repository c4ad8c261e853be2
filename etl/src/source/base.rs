use std::future::Future;

use crate::error::EtlResult;
use crate::types::{Record, TableName, Watermark};

/// A system archived records are read from.
pub trait RowSource {
    type Cursor: RowCursor + Send;

    /// Opens a cursor over `table`, restricted to rows past `watermark` when one is given.
    ///
    /// Returns an estimate of the number of rows the cursor will yield together with the
    /// cursor itself. The estimate is only used for progress reporting.
    fn open(
        &self,
        table: &TableName,
        watermark: Option<Watermark>,
    ) -> impl Future<Output = EtlResult<(u64, Self::Cursor)>> + Send;
}

/// A forward only cursor over the rows of one table.
///
/// Chunks are yielded in a stable order and the cursor never restarts once exhausted. Exactly
/// one of [`RowCursor::close`] and [`RowCursor::abort`] should be called to release the
/// resources held on the source.
pub trait RowCursor {
    /// Fetches the next chunk of records, `None` once the cursor is exhausted.
    fn next_chunk(&mut self) -> impl Future<Output = EtlResult<Option<Vec<Record>>>> + Send;

    /// Releases the cursor after a successful read.
    fn close(self) -> impl Future<Output = EtlResult<()>> + Send;

    /// Releases the cursor after a failure, discarding any state held on the source.
    fn abort(self) -> impl Future<Output = EtlResult<()>> + Send;
}
