//! In-memory engine for tests.
//!
//! Mirrors the engine behavior the core relies on: 404 semantics, PIT
//! snapshots with `_id` ascending paging, reindex that only materializes the
//! destination when there is something to copy, and bulk replay.

use super::{BulkSummary, Document, LiveIndexState, PageRequest, SearchEngine, SearchHit, SearchPage};
use crate::schema::JsonMap;
use crate::utils::errors::{LifecycleError, Result};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct MemoryIndex {
    mapping: JsonMap,
    settings: JsonMap,
    docs: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct MemoryState {
    indices: BTreeMap<String, MemoryIndex>,
    pits: HashMap<String, Vec<Document>>,
    next_pit: u64,
    faults: HashSet<String>,
    calls: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryEngine {
    state: Mutex<MemoryState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_index(&self, name: &str, mapping: Value, settings: Value) {
        let mut state = self.state.lock().unwrap();
        state.indices.insert(
            name.to_string(),
            MemoryIndex {
                mapping: mapping.as_object().cloned().unwrap_or_default(),
                settings: settings.as_object().cloned().unwrap_or_default(),
                docs: BTreeMap::new(),
            },
        );
    }

    pub fn insert_docs(&self, index: &str, docs: impl IntoIterator<Item = (String, Value)>) {
        let mut state = self.state.lock().unwrap();
        let target = state.indices.entry(index.to_string()).or_default();
        target.docs.extend(docs);
    }

    pub fn documents(&self, index: &str) -> Vec<(String, Value)> {
        let state = self.state.lock().unwrap();
        state
            .indices
            .get(index)
            .map(|i| i.docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn mapping(&self, index: &str) -> Option<JsonMap> {
        let state = self.state.lock().unwrap();
        state.indices.get(index).map(|i| i.mapping.clone())
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.state.lock().unwrap().indices.contains_key(index)
    }

    pub fn open_pits(&self) -> usize {
        self.state.lock().unwrap().pits.len()
    }

    /// Make the operation fail, e.g. `"search"`, `"get_index:ta_video"`.
    pub fn fail(&self, key: &str) {
        self.state.lock().unwrap().faults.insert(key.to_string());
    }

    pub fn heal(&self, key: &str) {
        self.state.lock().unwrap().faults.remove(key);
    }

    /// Every call made so far, as `operation:target`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn enter(state: &mut MemoryState, operation: &str, target: &str) -> Result<()> {
        let key = format!("{}:{}", operation, target);
        state.calls.push(key.clone());
        if state.faults.contains(operation) || state.faults.contains(&key) {
            return Err(LifecycleError::upstream(operation, 500, "injected fault"));
        }
        Ok(())
    }
}

/// Parse `index` bulk actions back into documents.
fn decode_bulk(payload: &str) -> Result<Vec<Document>> {
    let malformed = |message: String| LifecycleError::upstream("bulk", 400, message);
    let mut lines = payload.lines().filter(|line| !line.trim().is_empty());
    let mut documents = Vec::new();

    while let Some(action_line) = lines.next() {
        let action: Value = serde_json::from_str(action_line)?;
        let meta = action
            .get("index")
            .ok_or_else(|| malformed(format!("unsupported action: {}", action_line)))?;
        let (Some(index), Some(id)) = (
            meta.get("_index").and_then(Value::as_str),
            meta.get("_id").and_then(Value::as_str),
        ) else {
            return Err(malformed(format!("action without _index/_id: {}", action_line)));
        };

        let source_line = lines
            .next()
            .ok_or_else(|| malformed(format!("missing source for {}", id)))?;
        documents.push(Document {
            id: id.to_string(),
            index: index.to_string(),
            source: serde_json::from_str(source_line)?,
        });
    }

    Ok(documents)
}

fn not_found(operation: &str, index: &str) -> LifecycleError {
    LifecycleError::upstream(operation, 404, format!("no such index [{}]", index))
}

impl SearchEngine for MemoryEngine {
    async fn get_index(&self, index: &str) -> Result<Option<LiveIndexState>> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, "get_index", index)?;
        Ok(state.indices.get(index).map(|i| LiveIndexState {
            mapping: i.mapping.clone(),
            settings: i.settings.clone(),
        }))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, "create_index", index)?;
        if state.indices.contains_key(index) {
            return Err(LifecycleError::upstream("create_index", 400, "resource_already_exists_exception"));
        }
        let object_at = |pointer: &str| {
            body.pointer(pointer)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };
        state.indices.insert(
            index.to_string(),
            MemoryIndex {
                mapping: object_at("/mappings/properties"),
                settings: object_at("/settings"),
                docs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, "delete_index", index)?;
        Ok(state.indices.remove(index).is_some())
    }

    async fn reindex(&self, source: &str, dest: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, "reindex", &format!("{}>{}", source, dest))?;
        let docs = state
            .indices
            .get(source)
            .ok_or_else(|| not_found("reindex", source))?
            .docs
            .clone();
        if docs.is_empty() {
            return Ok(());
        }
        state.indices.entry(dest.to_string()).or_default().docs.extend(docs);
        Ok(())
    }

    async fn open_pit(&self, index: &str, _keep_alive: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, "open_pit", index)?;
        let snapshot: Vec<Document> = state
            .indices
            .get(index)
            .ok_or_else(|| not_found("open_pit", index))?
            .docs
            .iter()
            .map(|(id, source)| Document {
                id: id.clone(),
                index: index.to_string(),
                source: source.clone(),
            })
            .collect();
        state.next_pit += 1;
        let pit_id = format!("pit-{}", state.next_pit);
        state.pits.insert(pit_id.clone(), snapshot);
        Ok(pit_id)
    }

    async fn search_page(&self, request: &PageRequest<'_>) -> Result<SearchPage> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, "search", request.pit_id)?;
        let snapshot = state
            .pits
            .get(request.pit_id)
            .ok_or_else(|| LifecycleError::upstream("search", 404, "search_context_missing_exception"))?;

        let after = request
            .search_after
            .and_then(|a| a.first())
            .and_then(Value::as_str);
        let hits = snapshot
            .iter()
            .filter(|doc| after.map_or(true, |a| doc.id.as_str() > a))
            .take(request.size)
            .map(|doc| SearchHit {
                document: doc.clone(),
                sort: Some(vec![json!(doc.id)]),
            })
            .collect();

        Ok(SearchPage {
            pit_id: Some(request.pit_id.to_string()),
            hits,
        })
    }

    async fn close_pit(&self, pit_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, "close_pit", pit_id)?;
        state.pits.remove(pit_id);
        Ok(())
    }

    async fn bulk(&self, payload: &str) -> Result<BulkSummary> {
        let docs = decode_bulk(payload)?;
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, "bulk", "_bulk")?;
        let items = docs.len();
        for doc in docs {
            state
                .indices
                .entry(doc.index)
                .or_default()
                .docs
                .insert(doc.id, doc.source);
        }
        Ok(BulkSummary {
            items,
            failed: 0,
            first_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::bulk;

    #[test]
    fn test_bulk_payload_decodes_to_original_documents() {
        let docs = vec![
            Document {
                id: "a".to_string(),
                index: "ta_video".to_string(),
                source: json!({"title": "one", "tags": ["x", "y"]}),
            },
            Document {
                id: "b".to_string(),
                index: "ta_channel".to_string(),
                source: json!({"channel_name": "line\nbreak"}),
            },
        ];
        assert_eq!(decode_bulk(&bulk::encode(&docs).unwrap()).unwrap(), docs);
        assert!(decode_bulk(&bulk::encode(&[]).unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_dangling_action_is_rejected() {
        let payload = "{\"index\":{\"_index\":\"ta_video\",\"_id\":\"a\"}}\n";
        assert!(decode_bulk(payload).is_err());
    }
}
