//! Rotation of automatic backups.

use super::archive::ArchivePackager;
use super::manifest::BackupRecord;
use tracing::{info, warn};

/// What a rotation pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rotation {
    /// File names deleted
    pub removed: Vec<String>,
    /// One message per archive that should have gone but could not be deleted
    pub failures: Vec<String>,
}

pub struct RetentionManager<'a> {
    packager: &'a ArchivePackager,
}

impl<'a> RetentionManager<'a> {
    pub fn new(packager: &'a ArchivePackager) -> Self {
        Self { packager }
    }

    /// Delete automatic backups beyond the newest `keep`. `backups` must be
    /// sorted newest first, as [`ArchivePackager::list`] returns them.
    /// `keep == 0` disables rotation. A failed delete does not stop the pass.
    pub fn rotate(&self, backups: &[BackupRecord], keep: usize) -> Rotation {
        let mut rotation = Rotation::default();
        if keep == 0 {
            return rotation;
        }

        let auto: Vec<&BackupRecord> = backups.iter().filter(|b| b.is_auto()).collect();
        if auto.len() <= keep {
            info!(auto = auto.len(), keep, "No backup files to rotate");
            return rotation;
        }

        for record in &auto[keep..] {
            info!(archive = %record.filename, "Removing old backup");
            match self.packager.remove(&record.filename) {
                Ok(()) => rotation.removed.push(record.filename.clone()),
                Err(e) => {
                    warn!(archive = %record.filename, error = %e, "Failed to remove old backup");
                    rotation.failures.push(format!("{}: {}", record.filename, e));
                }
            }
        }
        rotation
    }
}
