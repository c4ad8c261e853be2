use serde_json::Value;
use std::collections::HashSet;
use tracing::trace;

use crate::error::EtlResult;
use crate::transform::Transformer;
use crate::types::{DOCUMENT_ID_KEY, IndexDocument, Record};

/// Prepares records for the search index.
///
/// The document id is taken from the integer `_id` field of the payload, signed or unsigned
/// up to `u64::MAX`. Records whose payload is not an object or that lack a usable `_id` are
/// skipped. Denylisted top level keys and `_id`
/// are removed from the indexed body.
#[derive(Debug, Clone, Default)]
pub struct IndexTransformer {
    denylist: HashSet<String>,
}

impl IndexTransformer {
    pub fn new<I, K>(denylist: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            denylist: denylist.into_iter().map(Into::into).collect(),
        }
    }
}

impl Transformer for IndexTransformer {
    type Document = IndexDocument;

    fn transform(&self, record: Record) -> EtlResult<Option<IndexDocument>> {
        let Value::Object(mut body) = record.payload else {
            trace!(record_id = record.id, "skipping record with a non object payload");
            return Ok(None);
        };

        let Some(id) = body.get(DOCUMENT_ID_KEY).and_then(document_id) else {
            trace!(record_id = record.id, "skipping record without an integer `_id`");
            return Ok(None);
        };

        body.retain(|key, _| key != DOCUMENT_ID_KEY && !self.denylist.contains(key));

        Ok(Some(IndexDocument::new(id, body)))
    }
}

/// Returns the value as an id when it is a JSON integer. Floats are never ids.
fn document_id(value: &Value) -> Option<i128> {
    value
        .as_i64()
        .map(i128::from)
        .or_else(|| value.as_u64().map(i128::from))
}
