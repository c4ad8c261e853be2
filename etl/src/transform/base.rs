use crate::error::EtlResult;
use crate::types::Record;

/// Turns source records into documents for one kind of sink.
///
/// `Ok(None)` rejects the record without failing the run. Errors abort the run.
pub trait Transformer {
    type Document: Send + 'static;

    fn transform(&self, record: Record) -> EtlResult<Option<Self::Document>>;
}
