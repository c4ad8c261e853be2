use std::future::Future;

use crate::error::EtlResult;

/// Trait for systems that receive the documents of an export run.
///
/// Documents arrive in source order, one chunk at a time. A destination is used for a single
/// run and consumed by [`Destination::close`] when the run succeeds or by
/// [`Destination::abort`] when it fails.
pub trait Destination {
    type Document: Send + 'static;

    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Writes a chunk of documents, in order.
    ///
    /// Implementations may hold documents back in a buffer, everything written is delivered at
    /// the latest by [`Destination::close`].
    fn write_documents(
        &mut self,
        documents: Vec<Self::Document>,
    ) -> impl Future<Output = EtlResult<()>> + Send;

    /// Delivers any buffered documents and releases the destination.
    fn close(self) -> impl Future<Output = EtlResult<()>> + Send;

    /// Releases the destination after a failed run.
    ///
    /// Implementations leave behind as much complete output as they safely can. Failures are
    /// logged and never replace the error that caused the abort.
    fn abort(self) -> impl Future<Output = ()> + Send;
}
