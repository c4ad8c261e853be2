use std::path::PathBuf;
use tokio::task::{self, JoinError};
use tracing::{info, warn};

use crate::destination::Destination;
use crate::destination::archive::{ArchiveSummary, ArchiveWriter, ArchiveWriterOptions};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::types::ArchiveDocument;
use crate::{bail, etl_error};

/// Async adapter running an [`ArchiveWriter`] on the blocking thread pool.
///
/// Each chunk is written by one blocking task and chunks are awaited one after the other, so
/// lines keep the order in which documents were handed over.
pub struct ArchiveDestination {
    path: PathBuf,
    writer: Option<ArchiveWriter>,
}

impl ArchiveDestination {
    /// Opens the archive file at `path`.
    pub async fn open(path: PathBuf, options: ArchiveWriterOptions) -> EtlResult<Self> {
        let writer_path = path.clone();
        let writer = task::spawn_blocking(move || ArchiveWriter::open(writer_path, options))
            .await
            .map_err(join_error)??;

        Ok(Self {
            path,
            writer: Some(writer),
        })
    }

    async fn finish(mut self) -> EtlResult<ArchiveSummary> {
        let Some(writer) = self.writer.take() else {
            bail!(ErrorKind::InvalidState, "Archive writer is no longer available");
        };

        task::spawn_blocking(move || writer.close())
            .await
            .map_err(join_error)?
    }
}

impl Destination for ArchiveDestination {
    type Document = ArchiveDocument;

    fn name() -> &'static str {
        "archive"
    }

    async fn write_documents(&mut self, documents: Vec<ArchiveDocument>) -> EtlResult<()> {
        // A writer lost to a failed task is dropped on that task, which finishes the frame.
        let Some(mut writer) = self.writer.take() else {
            bail!(ErrorKind::InvalidState, "Archive writer is no longer available");
        };

        let (writer, result) = task::spawn_blocking(move || {
            let result = documents
                .iter()
                .try_for_each(|document| writer.write(document));
            (writer, result)
        })
        .await
        .map_err(join_error)?;

        self.writer = Some(writer);

        result
    }

    async fn close(self) -> EtlResult<()> {
        let path = self.path.clone();
        let summary = self.finish().await?;

        info!(
            path = %path.display(),
            lines = summary.lines,
            uncompressed_bytes = summary.uncompressed_bytes,
            compressed_bytes = summary.compressed_bytes,
            "archive file closed"
        );

        Ok(())
    }

    async fn abort(self) {
        let path = self.path.clone();

        match self.finish().await {
            Ok(summary) => warn!(
                path = %path.display(),
                lines = summary.lines,
                "run failed, archive file closed with the lines written so far"
            ),
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "run failed and the archive file could not be closed"
            ),
        }
    }
}

fn join_error(err: JoinError) -> EtlError {
    etl_error!(
        ErrorKind::DestinationIoError,
        "Archive write task failed",
        err.to_string(),
        source: err
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use std::fs;

    fn document(value: serde_json::Value) -> ArchiveDocument {
        let serde_json::Value::Object(fields) = value else {
            panic!("expected an object");
        };
        ArchiveDocument::new(fields)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn chunks_are_appended_in_order() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("out.ndjson.zst");

        let mut destination = ArchiveDestination::open(path.clone(), ArchiveWriterOptions::default())
            .await
            .unwrap();
        destination
            .write_documents(vec![document(json!({"a": 1})), document(json!({"a": 2}))])
            .await
            .unwrap();
        destination
            .write_documents(vec![ArchiveDocument::new(Map::new())])
            .await
            .unwrap();
        destination.close().await.unwrap();

        let output = zstd::decode_all(fs::read(&path).unwrap().as_slice()).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "{\"a\":1}\n{\"a\":2}\n{}\n"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn abort_finishes_the_frame() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("aborted.ndjson.zst");

        let mut destination = ArchiveDestination::open(path.clone(), ArchiveWriterOptions::default())
            .await
            .unwrap();
        destination
            .write_documents(vec![document(json!({"a": 1}))])
            .await
            .unwrap();
        destination.abort().await;

        let output = zstd::decode_all(fs::read(&path).unwrap().as_slice()).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "{\"a\":1}\n");
    }
}
