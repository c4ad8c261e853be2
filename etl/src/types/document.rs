use serde::Serialize;
use serde_json::{Map, Value};

/// Key injected into every archived document holding the archive time in epoch seconds.
pub const ARCHIVED_ON_KEY: &str = "_archived_on";

/// Key of the payload field carrying the document id of the search index.
pub const DOCUMENT_ID_KEY: &str = "_id";

/// Document written as one line of the cold storage archive.
///
/// Serializes as the bare object, keys in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ArchiveDocument(Map<String, Value>);

impl ArchiveDocument {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

/// Document sent to the search index, addressed by `id`.
///
/// The id covers the whole `i64` and `u64` range of JSON integers.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub id: i128,
    pub body: Map<String, Value>,
}

impl IndexDocument {
    pub fn new(id: impl Into<i128>, body: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}
