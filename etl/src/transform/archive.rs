use serde_json::Value;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::transform::Transformer;
use crate::types::{ARCHIVED_ON_KEY, ArchiveDocument, Record};

/// Prepares records for the cold storage archive.
///
/// The payload object is kept as is and `_archived_on` is set to the archive time in whole
/// epoch seconds. A record without an archive time or with a non object payload cannot be
/// archived faithfully and aborts the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveTransformer;

impl Transformer for ArchiveTransformer {
    type Document = ArchiveDocument;

    fn transform(&self, record: Record) -> EtlResult<Option<ArchiveDocument>> {
        let Some(archived_on) = record.archived_on_epoch_seconds() else {
            bail!(
                ErrorKind::MalformedRecord,
                "Archived record has no archive timestamp",
                format!("record {} has no `archived_on` value", record.id)
            );
        };

        let Value::Object(mut fields) = record.payload else {
            bail!(
                ErrorKind::MalformedRecord,
                "Archived record payload is not an object",
                format!("record {} has a `data` value that is not a JSON object", record.id)
            );
        };

        // An existing key keeps its position and only has its value replaced.
        fields.insert(ARCHIVED_ON_KEY.to_owned(), Value::from(archived_on));

        Ok(Some(ArchiveDocument::new(fields)))
    }
}
