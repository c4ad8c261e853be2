use metrics::{counter, histogram};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::destination::Destination;
use crate::destination::elasticsearch::{BulkClient, encode_bulk_body};
use crate::error::EtlResult;
use crate::metrics::{
    ETL_BULK_ITEM_FAILURES_TOTAL, ETL_BULK_REQUEST_DURATION_SECONDS, ETL_BULK_REQUESTS_TOTAL,
};
use crate::types::IndexDocument;

/// Accumulates index documents and sends them in `_bulk` requests of `batch_size` documents.
///
/// [`BulkIndexer::add`] flushes as soon as the batch is full and [`BulkIndexer::flush`] sends
/// whatever is left. The batch outlives single tables, so a run only produces one partial
/// request at its very end.
#[derive(Debug)]
pub struct BulkIndexer<C> {
    client: C,
    batch: Vec<IndexDocument>,
    batch_size: usize,
    flushes: u64,
    documents_flushed: u64,
    sink_failed: bool,
}

impl<C> BulkIndexer<C>
where
    C: BulkClient,
{
    pub fn new(client: C, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);

        Self {
            client,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            flushes: 0,
            documents_flushed: 0,
            sink_failed: false,
        }
    }

    /// Number of documents waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Number of requests sent so far.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn documents_flushed(&self) -> u64 {
        self.documents_flushed
    }

    /// Appends a document, flushing when the batch reaches `batch_size`.
    pub async fn add(&mut self, document: IndexDocument) -> EtlResult<()> {
        self.batch.push(document);

        if self.batch.len() >= self.batch_size {
            self.flush().await?;
        }

        Ok(())
    }

    /// Sends the held documents as one request. Does nothing when the batch is empty.
    pub async fn flush(&mut self) -> EtlResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let documents = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));

        let result = self.send(&documents).await;
        if result.is_err() {
            self.sink_failed = true;
        }

        result
    }

    async fn send(&mut self, documents: &[IndexDocument]) -> EtlResult<()> {
        let document_count = documents.len();
        let body = encode_bulk_body(documents)?;

        debug!(document_count, body_bytes = body.len(), "sending bulk request");

        let before_sending = Instant::now();
        let response = self.client.bulk(body, document_count).await?;

        self.flushes += 1;
        self.documents_flushed += document_count as u64;

        counter!(ETL_BULK_REQUESTS_TOTAL).increment(1);
        histogram!(ETL_BULK_REQUEST_DURATION_SECONDS)
            .record(before_sending.elapsed().as_secs_f64());

        if response.errors {
            let failed_items = response.failed_items().count();
            let first_reason = response
                .failed_items()
                .find_map(|item| item.error.as_ref())
                .map(|error| error.to_string())
                .unwrap_or_default();

            counter!(ETL_BULK_ITEM_FAILURES_TOTAL).increment(failed_items as u64);
            warn!(
                document_count,
                failed_items,
                %first_reason,
                "index reported failed items in bulk response"
            );
        }

        Ok(())
    }
}

impl<C> Destination for BulkIndexer<C>
where
    C: BulkClient + Send + Sync,
{
    type Document = IndexDocument;

    fn name() -> &'static str {
        "elasticsearch"
    }

    async fn write_documents(&mut self, documents: Vec<IndexDocument>) -> EtlResult<()> {
        for document in documents {
            self.add(document).await?;
        }

        Ok(())
    }

    async fn close(mut self) -> EtlResult<()> {
        self.flush().await?;

        info!(
            flushes = self.flushes,
            documents = self.documents_flushed,
            "bulk indexing finished"
        );

        Ok(())
    }

    async fn abort(mut self) {
        let pending = self.pending();

        if self.sink_failed {
            warn!(pending, "index request failed, dropping documents held in the batch");
            return;
        }

        match self.flush().await {
            Ok(()) => warn!(
                flushed = pending,
                "run failed, sent the documents held in the batch"
            ),
            Err(err) => warn!(
                pending,
                error = %err,
                "run failed and the documents held in the batch could not be sent"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bail;
    use crate::destination::elasticsearch::BulkResponse;
    use crate::error::ErrorKind;
    use serde_json::Map;
    use std::sync::{Arc, Mutex};

    /// Records the document ids of every request it receives.
    #[derive(Debug, Clone, Default)]
    struct RecordingClient {
        requests: Arc<Mutex<Vec<Vec<i64>>>>,
        fail: bool,
    }

    impl RecordingClient {
        fn requests(&self) -> Vec<Vec<i64>> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl BulkClient for RecordingClient {
        async fn bulk(&self, body: String, document_count: usize) -> EtlResult<BulkResponse> {
            if self.fail {
                bail!(
                    ErrorKind::DestinationQueryFailed,
                    "Bulk request was rejected by the index"
                );
            }

            let ids: Vec<i64> = body
                .lines()
                .step_by(2)
                .map(|line| {
                    let action: serde_json::Value = serde_json::from_str(line).unwrap();
                    action["index"]["_id"].as_str().unwrap().parse().unwrap()
                })
                .collect();
            assert_eq!(ids.len(), document_count);
            self.requests.lock().unwrap().push(ids);

            Ok(BulkResponse::default())
        }
    }

    fn document(id: i64) -> IndexDocument {
        IndexDocument::new(id, Map::new())
    }

    #[tokio::test]
    async fn full_batches_flush_on_add() {
        let client = RecordingClient::default();
        let mut indexer = BulkIndexer::new(client.clone(), 2);

        for id in 1..=3 {
            indexer.add(document(id)).await.unwrap();
        }
        assert_eq!(client.requests(), vec![vec![1, 2]]);
        assert_eq!(indexer.pending(), 1);

        indexer.close().await.unwrap();
        assert_eq!(client.requests(), vec![vec![1, 2], vec![3]]);
    }

    #[tokio::test]
    async fn flush_count_is_ceil_of_documents_over_batch_size() {
        let cases: [(usize, usize); 6] = [(0, 3), (1, 3), (3, 3), (7, 3), (10, 1), (5, 10)];

        for (documents, batch_size) in cases {
            let client = RecordingClient::default();
            let mut indexer = BulkIndexer::new(client.clone(), batch_size);

            indexer
                .write_documents((0..documents as i64).map(document).collect())
                .await
                .unwrap();
            indexer.flush().await.unwrap();
            // A second flush of the now empty batch is not a request.
            indexer.flush().await.unwrap();

            let requests = client.requests();
            assert_eq!(requests.len(), documents.div_ceil(batch_size));
            assert_eq!(indexer.flushes(), requests.len() as u64);
            assert_eq!(
                requests.into_iter().flatten().collect::<Vec<_>>(),
                (0..documents as i64).collect::<Vec<_>>()
            );
        }
    }

    #[tokio::test]
    async fn abort_flushes_pending_documents() {
        let client = RecordingClient::default();
        let mut indexer = BulkIndexer::new(client.clone(), 10);
        indexer.add(document(1)).await.unwrap();

        indexer.abort().await;

        assert_eq!(client.requests(), vec![vec![1]]);
    }

    #[tokio::test]
    async fn failed_request_is_fatal_and_not_retried_on_abort() {
        let client = RecordingClient {
            fail: true,
            ..Default::default()
        };
        let mut indexer = BulkIndexer::new(client.clone(), 1);

        let err = indexer.add(document(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
        assert_eq!(indexer.flushes(), 0);

        indexer.abort().await;
        assert!(client.requests().is_empty());
    }
}
