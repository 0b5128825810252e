//! Applying a changed mapping to an existing index.
//!
//! The sequence is backup → delete → recreate → restore → delete backup, all
//! on the same cluster. There is no rollback: when a step fails the error
//! names the last stage reached, which tells whether the documents currently
//! live only in the `_backup` index.

use crate::admin::IndexAdmin;
use crate::engine::SearchEngine;
use crate::schema::IndexDescriptor;
use crate::utils::errors::{LifecycleError, Result};
use serde::Serialize;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildStage {
    Idle,
    BackedUp,
    Deleted,
    Recreated,
    Restored,
    BackupCleaned,
}

impl fmt::Display for RebuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebuildStage::Idle => "idle",
            RebuildStage::BackedUp => "backed-up",
            RebuildStage::Deleted => "deleted",
            RebuildStage::Recreated => "recreated",
            RebuildStage::Restored => "restored",
            RebuildStage::BackupCleaned => "backup-cleaned",
        };
        f.write_str(name)
    }
}

/// Runs one rebuild. Callers serialize rebuilds of the same index.
pub struct Rebuilder<'a, 'b, E> {
    admin: &'b IndexAdmin<'a, E>,
}

impl<'a, 'b, E: SearchEngine> Rebuilder<'a, 'b, E> {
    pub fn new(admin: &'b IndexAdmin<'a, E>) -> Self {
        Self { admin }
    }

    pub async fn rebuild(&self, descriptor: &IndexDescriptor) -> Result<RebuildStage> {
        let name = &descriptor.name;
        let live = self.admin.physical_name(name);
        let backup = self.admin.backup_name(name);
        let mut stage = RebuildStage::Idle;

        let precheck = match self.admin.exists(&backup).await {
            Ok(false) => Ok(()),
            Ok(true) => Err(LifecycleError::Precondition(format!(
                "{} already exists from an earlier run; inspect and remove it first",
                backup
            ))),
            Err(e) => Err(e),
        };
        self.advance(name, &mut stage, RebuildStage::Idle, precheck)?;

        info!(index = %live, "Rebuilding index with new mapping");

        let outcome = self.admin.reindex(&live, &backup).await;
        self.advance(name, &mut stage, RebuildStage::BackedUp, outcome)?;

        let outcome = self.admin.delete(&live).await.map(drop);
        self.advance(name, &mut stage, RebuildStage::Deleted, outcome)?;

        let outcome = self.admin.create(descriptor).await;
        self.advance(name, &mut stage, RebuildStage::Recreated, outcome)?;

        // reindexing an empty index never creates the destination
        let outcome = match self.admin.exists(&backup).await {
            Ok(true) => self.admin.reindex(&backup, &live).await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };
        self.advance(name, &mut stage, RebuildStage::Restored, outcome)?;

        let outcome = self.admin.delete(&backup).await.map(drop);
        self.advance(name, &mut stage, RebuildStage::BackupCleaned, outcome)?;

        info!(index = %live, "Rebuild complete");
        Ok(stage)
    }

    fn advance(&self, name: &str, stage: &mut RebuildStage, next: RebuildStage, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                *stage = next;
                Ok(())
            }
            Err(e) => Err(LifecycleError::Rebuild {
                index: name.to_string(),
                stage: stage.to_string(),
                source: Box::new(e),
            }),
        }
    }
}
