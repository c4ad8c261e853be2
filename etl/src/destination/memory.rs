use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};

#[derive(Debug)]
struct Inner<T> {
    documents: Vec<T>,
    write_calls: usize,
    closed: bool,
    aborted: bool,
    fail_after_writes: Option<usize>,
}

/// In-memory destination for testing and development purposes.
///
/// Clones share the same storage, so a test can keep a handle and inspect the captured
/// documents after the pipeline consumed its copy.
#[derive(Debug, Clone)]
pub struct MemoryDestination<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Clone> MemoryDestination<T> {
    pub fn new() -> Self {
        let inner = Inner {
            documents: Vec::new(),
            write_calls: 0,
            closed: false,
            aborted: false,
            fail_after_writes: None,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Makes every write after the first `writes` successful ones fail with a sink error.
    pub async fn fail_after_writes(&self, writes: usize) {
        self.inner.lock().await.fail_after_writes = Some(writes);
    }

    /// Returns a copy of all documents stored in this destination.
    pub async fn documents(&self) -> Vec<T> {
        self.inner.lock().await.documents.clone()
    }

    pub async fn write_calls(&self) -> usize {
        self.inner.lock().await.write_calls
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    pub async fn is_aborted(&self) -> bool {
        self.inner.lock().await.aborted
    }
}

impl<T: Clone> Default for MemoryDestination<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Destination for MemoryDestination<T>
where
    T: Clone + Send + 'static,
{
    type Document = T;

    fn name() -> &'static str {
        "memory"
    }

    async fn write_documents(&mut self, documents: Vec<T>) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        if inner
            .fail_after_writes
            .is_some_and(|writes| inner.write_calls >= writes)
        {
            bail!(
                ErrorKind::DestinationIoError,
                "Memory destination rejected the write"
            );
        }

        info!("writing a batch of {} documents", documents.len());

        inner.write_calls += 1;
        inner.documents.extend(documents);

        Ok(())
    }

    async fn close(self) -> EtlResult<()> {
        self.inner.lock().await.closed = true;

        Ok(())
    }

    async fn abort(self) {
        self.inner.lock().await.aborted = true;
    }
}
