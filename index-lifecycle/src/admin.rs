//! Index administration: probe, create, delete, reindex.
//!
//! Every call logs its failure and hands it back; deciding whether to go on
//! is left to the caller.

use crate::engine::{LiveIndexState, SearchEngine};
use crate::schema::IndexDescriptor;
use crate::utils::errors::Result;
use tracing::{info, warn};

/// What an existence probe found out.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexProbe {
    Present(LiveIndexState),
    /// The engine answered "not found"
    Absent,
    /// No definitive answer; the index may well exist
    Unreachable(String),
}

pub struct IndexAdmin<'a, E> {
    engine: &'a E,
    index_prefix: &'a str,
}

impl<'a, E: SearchEngine> IndexAdmin<'a, E> {
    pub fn new(engine: &'a E, index_prefix: &'a str) -> Self {
        Self { engine, index_prefix }
    }

    pub fn engine(&self) -> &'a E {
        self.engine
    }

    /// `video` → `ta_video`
    pub fn physical_name(&self, name: &str) -> String {
        format!("{}{}", self.index_prefix, name)
    }

    /// `video` → `ta_video_backup`
    pub fn backup_name(&self, name: &str) -> String {
        format!("{}{}_backup", self.index_prefix, name)
    }

    pub async fn probe(&self, name: &str) -> IndexProbe {
        let index = self.physical_name(name);
        match self.engine.get_index(&index).await {
            Ok(Some(state)) => IndexProbe::Present(state),
            Ok(None) => IndexProbe::Absent,
            Err(e) => {
                warn!(index = %index, error = %e, "Existence probe failed");
                IndexProbe::Unreachable(e.to_string())
            }
        }
    }

    /// Whether a physical index exists. Unlike [`probe`](Self::probe), an
    /// inconclusive answer is an error.
    pub async fn exists(&self, index: &str) -> Result<bool> {
        Ok(self.engine.get_index(index).await?.is_some())
    }

    /// Create a blank index with exactly the descriptor's mapping and settings.
    pub async fn create(&self, descriptor: &IndexDescriptor) -> Result<()> {
        let index = self.physical_name(&descriptor.name);
        match self.engine.create_index(&index, &descriptor.creation_body()).await {
            Ok(()) => {
                info!(index = %index, "Created blank index");
                Ok(())
            }
            Err(e) => {
                warn!(index = %index, error = %e, "Failed to create index");
                Err(e)
            }
        }
    }

    /// Delete a physical index. An index that is already gone is not an error.
    pub async fn delete(&self, index: &str) -> Result<bool> {
        match self.engine.delete_index(index).await {
            Ok(true) => {
                info!(index = %index, "Deleted index");
                Ok(true)
            }
            Ok(false) => {
                info!(index = %index, "Index to delete does not exist");
                Ok(false)
            }
            Err(e) => {
                warn!(index = %index, error = %e, "Failed to delete index");
                Err(e)
            }
        }
    }

    pub async fn reindex(&self, source: &str, dest: &str) -> Result<()> {
        self.engine.reindex(source, dest).await.map_err(|e| {
            warn!(source = %source, dest = %dest, error = %e, "Reindex failed");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;
    use serde_json::json;

    fn descriptor() -> IndexDescriptor {
        IndexDescriptor {
            name: "video".to_string(),
            expected_mapping: json!({"title": {"type": "keyword"}}).as_object().cloned(),
            expected_settings: None,
        }
    }

    #[tokio::test]
    async fn test_probe_distinguishes_absent_from_unreachable() {
        let engine = MemoryEngine::new();
        let admin = IndexAdmin::new(&engine, "ta_");

        assert_eq!(admin.probe("video").await, IndexProbe::Absent);

        admin.create(&descriptor()).await.unwrap();
        match admin.probe("video").await {
            IndexProbe::Present(state) => assert_eq!(state.mapping["title"], json!({"type": "keyword"})),
            other => panic!("unexpected probe result: {:?}", other),
        }

        engine.fail("get_index:ta_video");
        assert!(matches!(admin.probe("video").await, IndexProbe::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_delete_of_missing_index_is_not_an_error() {
        let engine = MemoryEngine::new();
        let admin = IndexAdmin::new(&engine, "ta_");
        assert!(!admin.delete("ta_video").await.unwrap());

        engine.fail("delete_index");
        assert!(admin.delete("ta_video").await.is_err());
    }

    #[tokio::test]
    async fn test_create_existing_index_fails() {
        let engine = MemoryEngine::new();
        let admin = IndexAdmin::new(&engine, "ta_");
        admin.create(&descriptor()).await.unwrap();
        assert!(admin.create(&descriptor()).await.is_err());
    }

    #[test]
    fn test_index_names() {
        let engine = MemoryEngine::new();
        let admin = IndexAdmin::new(&engine, "ta_");
        assert_eq!(admin.physical_name("channel"), "ta_channel");
        assert_eq!(admin.backup_name("channel"), "ta_channel_backup");
    }
}
