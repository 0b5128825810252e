//! Point-in-time backups of all indexed documents.
//!
//! Export: [`scanner`] pulls every document, [`bulk`] encodes it for replay and
//! [`archive`] zips the per-index files. Restore runs the other way through
//! [`restore`]; [`retention`] rotates automatic archives.

pub mod archive;
pub mod bulk;
pub mod manifest;
pub mod restore;
pub mod retention;
pub mod scanner;

pub use archive::ArchivePackager;
pub use manifest::{BackupManifest, BackupReason, BackupRecord, IndexExport};
pub use restore::{ReplayOutcome, RestoreEngine};
pub use retention::{RetentionManager, Rotation};
pub use scanner::{CorpusScanner, PointInTimeCursor};
