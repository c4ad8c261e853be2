use serde::Serialize;

use crate::error::EtlResult;
use crate::types::IndexDocument;

#[derive(Serialize)]
struct BulkAction {
    index: BulkActionMetadata,
}

#[derive(Serialize)]
struct BulkActionMetadata {
    #[serde(rename = "_id")]
    id: String,
}

/// Encodes documents as a `_bulk` request body.
///
/// Every document contributes an `index` action line addressed by its id followed by the
/// document body, each terminated by a newline.
pub fn encode_bulk_body(documents: &[IndexDocument]) -> EtlResult<String> {
    let mut body = String::new();

    for document in documents {
        let action = BulkAction {
            index: BulkActionMetadata {
                id: document.id.to_string(),
            },
        };

        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&document.body)?);
        body.push('\n');
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn document(id: i64, body: Value) -> IndexDocument {
        let Value::Object(body) = body else {
            panic!("expected an object");
        };
        IndexDocument::new(id, body)
    }

    #[test]
    fn body_pairs_action_and_source_lines() {
        let documents = vec![
            document(1, json!({"x": 1, "com": "first"})),
            document(-2, json!({"nested": {"b": true, "a": null}})),
        ];

        let body = encode_bulk_body(&documents).unwrap();

        assert!(body.ends_with('\n'));
        insta::assert_snapshot!(body.trim_end(), @r#"
        {"index":{"_id":"1"}}
        {"x":1,"com":"first"}
        {"index":{"_id":"-2"}}
        {"nested":{"b":true,"a":null}}
        "#);
    }

    #[test]
    fn empty_batch_encodes_to_empty_body() {
        assert_eq!(encode_bulk_body(&[]).unwrap(), "");
    }
}
