//! Full-index export over a point-in-time cursor.
//!
//! Pages are requested sorted by `_id` and resumed with `search_after`, so the
//! export is complete and stable even while the index is being written to.

use crate::engine::{Document, PageRequest, SearchEngine, SearchPage};
use crate::utils::errors::{LifecycleError, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Server-held snapshot handle plus the position of the next page.
#[derive(Debug, Clone, PartialEq)]
pub struct PointInTimeCursor {
    pub pit_id: String,
    pub keep_alive: String,
    pub search_after: Option<Vec<Value>>,
}

impl PointInTimeCursor {
    pub fn new(pit_id: String, keep_alive: &str) -> Self {
        Self {
            pit_id,
            keep_alive: keep_alive.to_string(),
            search_after: None,
        }
    }

    pub fn page_request(&self, size: usize) -> PageRequest<'_> {
        PageRequest {
            pit_id: &self.pit_id,
            keep_alive: &self.keep_alive,
            size,
            search_after: self.search_after.as_deref(),
        }
    }

    /// Move past the last hit of `page`. Fails when the page cannot be resumed
    /// from, which would otherwise loop forever or silently truncate.
    fn advance(&mut self, page: &SearchPage) -> Result<()> {
        if let Some(pit_id) = &page.pit_id {
            self.pit_id.clone_from(pit_id);
        }

        let last = page
            .hits
            .last()
            .and_then(|hit| hit.sort.clone())
            .ok_or_else(|| LifecycleError::upstream("search", 200, "hit without sort values"))?;

        if self.search_after.as_ref() == Some(&last) {
            return Err(LifecycleError::upstream(
                "search",
                200,
                format!("cursor did not advance past {:?}", last),
            ));
        }
        self.search_after = Some(last);
        Ok(())
    }
}

pub struct CorpusScanner<'a, E> {
    engine: &'a E,
    page_size: usize,
    keep_alive: &'a str,
}

impl<'a, E: SearchEngine> CorpusScanner<'a, E> {
    pub fn new(engine: &'a E, page_size: usize, keep_alive: &'a str) -> Self {
        Self {
            engine,
            page_size: page_size.max(1),
            keep_alive,
        }
    }

    /// Export every document of `index`, ordered by id.
    ///
    /// The point in time is released whether the scan succeeds or not.
    pub async fn scan(&self, index: &str) -> Result<Vec<Document>> {
        let pit_id = self.engine.open_pit(index, self.keep_alive).await?;
        let mut cursor = PointInTimeCursor::new(pit_id, self.keep_alive);

        let result = self.collect_pages(index, &mut cursor).await;

        if let Err(e) = self.engine.close_pit(&cursor.pit_id).await {
            // the lease runs out on its own; only the scan result matters here
            warn!(index = %index, error = %e, "Failed to release point in time");
        }

        let documents = result?;
        info!(index = %index, documents = documents.len(), "Exported index");
        Ok(documents)
    }

    async fn collect_pages(&self, index: &str, cursor: &mut PointInTimeCursor) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        let mut pages = 0usize;

        loop {
            let page = self
                .engine
                .search_page(&cursor.page_request(self.page_size))
                .await?;
            if page.hits.is_empty() {
                break;
            }

            pages += 1;
            cursor.advance(&page)?;
            documents.extend(page.hits.into_iter().map(|hit| hit.document));
        }

        debug!(index = %index, pages, "Scan complete");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;
    use crate::engine::SearchHit;
    use serde_json::json;
    use std::collections::HashSet;

    fn seeded(count: usize) -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.add_index("ta_video", json!({}), json!({}));
        engine.insert_docs(
            "ta_video",
            (0..count).map(|i| (format!("vid-{:03}", i), json!({ "n": i }))),
        );
        engine
    }

    #[tokio::test]
    async fn test_scan_spans_pages_without_gaps_or_duplicates() {
        let engine = seeded(25);

        for page_size in [1, 7, 10, 100] {
            let docs = CorpusScanner::new(&engine, page_size, "1m").scan("ta_video").await.unwrap();

            assert_eq!(docs.len(), 25, "page size {}", page_size);
            let ids: HashSet<&str> = docs.iter().map(|d| d.id.as_str()).collect();
            assert_eq!(ids.len(), 25);
            assert!(docs.windows(2).all(|w| w[0].id < w[1].id));
        }
        assert_eq!(engine.open_pits(), 0);
    }

    #[tokio::test]
    async fn test_scan_is_repeatable() {
        let engine = seeded(12);
        let scanner = CorpusScanner::new(&engine, 5, "1m");
        let first = scanner.scan("ta_video").await.unwrap();
        let second = scanner.scan("ta_video").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_index_releases_pit() {
        let engine = seeded(0);
        let docs = CorpusScanner::new(&engine, 100, "1m").scan("ta_video").await.unwrap();
        assert!(docs.is_empty());
        assert_eq!(engine.open_pits(), 0);
        assert!(engine.calls().iter().any(|c| c.starts_with("close_pit:")));
    }

    #[tokio::test]
    async fn test_search_failure_surfaces_and_releases_pit() {
        let engine = seeded(3);
        engine.fail("search");

        let result = CorpusScanner::new(&engine, 100, "1m").scan("ta_video").await;
        assert!(matches!(result, Err(LifecycleError::Upstream { .. })));
        assert_eq!(engine.open_pits(), 0);
    }

    #[tokio::test]
    async fn test_missing_index_fails_before_opening() {
        let engine = MemoryEngine::new();
        let result = CorpusScanner::new(&engine, 100, "1m").scan("ta_missing").await;
        assert!(result.is_err());
        assert_eq!(engine.open_pits(), 0);
    }

    #[test]
    fn test_cursor_refuses_hits_without_sort() {
        let mut cursor = PointInTimeCursor::new("pit-1".to_string(), "1m");
        let page = SearchPage {
            pit_id: Some("pit-2".to_string()),
            hits: vec![SearchHit {
                document: Document {
                    id: "a".to_string(),
                    index: "ta_video".to_string(),
                    source: json!({}),
                },
                sort: None,
            }],
        };
        assert!(cursor.advance(&page).is_err());
    }

    #[test]
    fn test_cursor_tracks_refreshed_pit_and_sort() {
        let mut cursor = PointInTimeCursor::new("pit-1".to_string(), "1m");
        let page = SearchPage {
            pit_id: Some("pit-2".to_string()),
            hits: vec![SearchHit {
                document: Document {
                    id: "a".to_string(),
                    index: "ta_video".to_string(),
                    source: json!({}),
                },
                sort: Some(vec![json!("a")]),
            }],
        };
        cursor.advance(&page).unwrap();
        assert_eq!(cursor.pit_id, "pit-2");
        assert_eq!(cursor.search_after, Some(vec![json!("a")]));

        // same page again must not be accepted as progress
        assert!(cursor.advance(&page).is_err());
    }
}
