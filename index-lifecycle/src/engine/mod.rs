//! Search engine primitives used by the lifecycle core.
//!
//! [`SearchEngine`] is the seam between the core and the cluster: the
//! production implementation talks HTTP ([`client::EsClient`]), tests use an
//! in-memory engine.

pub mod client;
#[cfg(test)]
pub(crate) mod memory;

use crate::schema::JsonMap;
use crate::utils::errors::{LifecycleError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use client::EsClient;

/// Mapping and settings reported by the engine for an existing index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveIndexState {
    /// `mappings.properties`
    pub mapping: JsonMap,
    /// `settings.index`
    pub settings: JsonMap,
}

impl LiveIndexState {
    /// Build from the per-index entry of a `GET /<index>` response.
    pub fn from_index_body(body: &Value) -> Self {
        let object_at = |pointer: &str| {
            body.pointer(pointer)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };
        Self {
            mapping: object_at("/mappings/properties"),
            settings: object_at("/settings/index"),
        }
    }
}

/// One stored document. Identity is `(index, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub index: String,
    pub source: Value,
}

/// A search hit together with the sort key used to resume after it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub document: Document,
    pub sort: Option<Vec<Value>>,
}

/// One page of a point-in-time search.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest<'a> {
    pub pit_id: &'a str,
    pub keep_alive: &'a str,
    pub size: usize,
    pub search_after: Option<&'a [Value]>,
}

impl PageRequest<'_> {
    /// `match_all`, sorted by `_id` ascending, bound to the PIT.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "query": { "match_all": {} },
            "size": self.size,
            "pit": { "id": self.pit_id, "keep_alive": self.keep_alive },
            "sort": [{ "_id": { "order": "asc" } }],
        });
        if let Some(after) = self.search_after {
            body["search_after"] = Value::Array(after.to_vec());
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchPage {
    /// The engine may hand back a refreshed PIT id with every page
    pub pit_id: Option<String>,
    pub hits: Vec<SearchHit>,
}

impl SearchPage {
    pub fn from_response(body: &Value) -> Result<Self> {
        let raw_hits = body
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .ok_or_else(|| LifecycleError::upstream("search", 200, "response without hits.hits"))?;

        let mut hits = Vec::with_capacity(raw_hits.len());
        for hit in raw_hits {
            let id = hit.get("_id").and_then(Value::as_str);
            let index = hit.get("_index").and_then(Value::as_str);
            let (Some(id), Some(index)) = (id, index) else {
                return Err(LifecycleError::upstream("search", 200, format!("malformed hit: {}", hit)));
            };
            hits.push(SearchHit {
                document: Document {
                    id: id.to_string(),
                    index: index.to_string(),
                    source: hit.get("_source").cloned().unwrap_or(Value::Null),
                },
                sort: hit.get("sort").and_then(Value::as_array).cloned(),
            });
        }

        Ok(Self {
            pit_id: body.get("pit_id").and_then(Value::as_str).map(str::to_string),
            hits,
        })
    }
}

/// Outcome of a `_bulk` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkSummary {
    pub items: usize,
    pub failed: usize,
    pub first_error: Option<String>,
}

impl BulkSummary {
    pub fn from_response(body: &Value) -> Self {
        let items = body.get("items").and_then(Value::as_array);
        let failures: Vec<&Value> = items
            .into_iter()
            .flatten()
            .filter_map(|item| item.as_object()?.values().next())
            .filter_map(|action| action.get("error"))
            .collect();

        Self {
            items: items.map_or(0, Vec::len),
            failed: failures.len(),
            first_error: failures.first().map(|e| e.to_string()),
        }
    }
}

/// Administrative, scanning and ingest primitives of the search engine.
///
/// Implementations must report a definitive "index not found" as `Ok(None)` /
/// `Ok(false)` and everything else that is not a success as an error.
#[allow(async_fn_in_trait)]
pub trait SearchEngine {
    /// Mapping and settings of `index`, `None` if it does not exist.
    async fn get_index(&self, index: &str) -> Result<Option<LiveIndexState>>;

    async fn create_index(&self, index: &str, body: &Value) -> Result<()>;

    /// Returns `false` when the index did not exist.
    async fn delete_index(&self, index: &str) -> Result<bool>;

    /// Server-side copy of every document, refreshed on completion.
    async fn reindex(&self, source: &str, dest: &str) -> Result<()>;

    async fn open_pit(&self, index: &str, keep_alive: &str) -> Result<String>;

    async fn search_page(&self, request: &PageRequest<'_>) -> Result<SearchPage>;

    async fn close_pit(&self, pit_id: &str) -> Result<()>;

    /// Replays newline-delimited bulk actions.
    async fn bulk(&self, payload: &str) -> Result<BulkSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_state_from_index_body() {
        let body = json!({
            "mappings": {"properties": {"title": {"type": "text"}}},
            "settings": {"index": {"number_of_replicas": "0"}}
        });
        let state = LiveIndexState::from_index_body(&body);
        assert_eq!(state.mapping["title"], json!({"type": "text"}));
        assert_eq!(state.settings["number_of_replicas"], "0");

        let empty = LiveIndexState::from_index_body(&json!({"mappings": {}}));
        assert!(empty.mapping.is_empty());
    }

    #[test]
    fn test_page_request_body() {
        let after = [json!("doc-9")];
        let request = PageRequest {
            pit_id: "pit-1",
            keep_alive: "1m",
            size: 100,
            search_after: Some(&after),
        };
        let body = request.to_body();
        assert_eq!(body["pit"]["id"], "pit-1");
        assert_eq!(body["size"], 100);
        assert_eq!(body["sort"][0]["_id"]["order"], "asc");
        assert_eq!(body["search_after"], json!(["doc-9"]));

        let first = PageRequest { search_after: None, ..request };
        assert!(first.to_body().get("search_after").is_none());
    }

    #[test]
    fn test_search_page_parsing() {
        let body = json!({
            "pit_id": "pit-2",
            "hits": {"hits": [
                {"_index": "ta_video", "_id": "a", "_source": {"title": "x"}, "sort": ["a"]}
            ]}
        });
        let page = SearchPage::from_response(&body).unwrap();
        assert_eq!(page.pit_id.as_deref(), Some("pit-2"));
        assert_eq!(page.hits[0].document.id, "a");
        assert_eq!(page.hits[0].sort, Some(vec![json!("a")]));

        assert!(SearchPage::from_response(&json!({"took": 1})).is_err());
    }

    #[test]
    fn test_bulk_summary_counts_errors() {
        let body = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "a", "status": 201}},
                {"index": {"_id": "b", "status": 400, "error": {"type": "mapper_parsing_exception"}}}
            ]
        });
        let summary = BulkSummary::from_response(&body);
        assert_eq!(summary.items, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.first_error.unwrap().contains("mapper_parsing_exception"));
    }
}
