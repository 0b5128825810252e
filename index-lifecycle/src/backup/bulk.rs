//! Bulk-ingest wire format.
//!
//! Each document becomes an action line naming its index and id followed by
//! its raw source, one JSON object per line. The payload ends with a blank
//! line so the engine processes the last action.

use crate::engine::Document;
use crate::utils::errors::Result;
use serde_json::json;

pub fn encode(documents: &[Document]) -> Result<String> {
    let mut payload = String::new();
    for document in documents {
        let action = json!({ "index": { "_index": document.index, "_id": document.id } });
        payload.push_str(&serde_json::to_string(&action)?);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(&document.source)?);
        payload.push('\n');
    }
    payload.push('\n');
    Ok(payload)
}

/// An empty or whitespace-only payload has nothing to replay.
pub fn is_noop(payload: &str) -> bool {
    payload.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn doc(id: &str, source: Value) -> Document {
        Document {
            id: id.to_string(),
            index: "ta_video".to_string(),
            source,
        }
    }

    #[test]
    fn test_encode_layout() {
        let payload = encode(&[doc("abc", json!({"title": "first"}))]).unwrap();
        assert_eq!(
            payload,
            "{\"index\":{\"_index\":\"ta_video\",\"_id\":\"abc\"}}\n{\"title\":\"first\"}\n\n"
        );
    }

    #[test]
    fn test_empty_batch_is_noop() {
        assert!(is_noop(&encode(&[]).unwrap()));
        assert!(!is_noop(&encode(&[doc("a", json!({}))]).unwrap()));
    }

    #[test]
    fn test_every_document_is_one_action_pair() {
        let docs = vec![
            doc("a", json!({"title": "one", "tags": ["x", "y"]})),
            doc("b", json!({"title": "line\nbreak"})),
        ];
        let payload = encode(&docs).unwrap();
        let lines: Vec<&str> = payload.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 4);

        let source: Value = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(source["title"], "line\nbreak");
    }
}
