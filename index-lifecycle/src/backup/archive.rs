//! Zip packaging of export files.

use super::manifest::{BackupManifest, BackupRecord, MANIFEST_MEMBER};
use super::restore::is_bulk_member;
use crate::utils::errors::{LifecycleError, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Owns the backup working directory: transient export files and durable
/// archives.
#[derive(Debug, Clone)]
pub struct ArchivePackager {
    backup_dir: PathBuf,
    prefix: String,
}

impl ArchivePackager {
    pub fn new(backup_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.backup_dir)?;
        Ok(())
    }

    /// Write one loose export file into the backup directory.
    pub fn write_member(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.member_path(name)?;
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Compress `members` and the manifest into `archive_name`, then delete the
    /// loose members. The archive only appears under its final name once it is
    /// complete.
    pub fn pack(&self, members: &[PathBuf], archive_name: &str, manifest: &BackupManifest) -> Result<PathBuf> {
        let archive_path = self.member_path(archive_name)?;
        let partial_path = self.backup_dir.join(format!("{}.partial", archive_name));

        if let Err(e) = self.write_archive(&partial_path, members, manifest) {
            let _ = fs::remove_file(&partial_path);
            return Err(e);
        }
        fs::rename(&partial_path, &archive_path)?;

        self.discard(members);
        info!(archive = %archive_name, members = members.len(), "Backup archive written");
        Ok(archive_path)
    }

    fn write_archive(&self, path: &Path, members: &[PathBuf], manifest: &BackupManifest) -> Result<()> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(File::create(path)?);

        for member in members {
            let name = member
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| LifecycleError::Precondition(format!("invalid member path {}", member.display())))?;
            writer.start_file(name, options)?;
            io::copy(&mut File::open(member)?, &mut writer)?;
        }

        writer.start_file(MANIFEST_MEMBER, options)?;
        writer.write_all(&serde_json::to_vec_pretty(manifest)?)?;

        writer.finish()?.sync_all()?;
        Ok(())
    }

    /// Remove loose export files, ignoring ones already gone.
    pub fn discard(&self, members: &[PathBuf]) {
        for member in members {
            if let Err(e) = fs::remove_file(member) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(file = %member.display(), error = %e, "Failed to remove export file");
                }
            }
        }
    }

    /// Extract every member of `archive_name` into the backup directory and
    /// return the member names in archive order. The archive is kept. On
    /// failure nothing extracted stays behind.
    pub fn unpack(&self, archive_name: &str) -> Result<Vec<String>> {
        let archive_path = self.existing_archive(archive_name)?;
        let mut archive = ZipArchive::new(File::open(&archive_path)?)?;
        let entries = self.plain_members(&mut archive)?;

        let mut extracted = Vec::with_capacity(entries.len());
        if let Err(e) = self.extract(&mut archive, &entries, &mut extracted) {
            self.discard(&extracted);
            return Err(e);
        }

        debug!(archive = %archive_name, members = entries.len(), "Archive unpacked");
        Ok(entries.into_iter().map(|(_, name)| name).collect())
    }

    fn extract(
        &self,
        archive: &mut ZipArchive<File>,
        entries: &[(usize, String)],
        extracted: &mut Vec<PathBuf>,
    ) -> Result<()> {
        for (index, name) in entries {
            let mut entry = archive.by_index(*index)?;
            let out_path = self.backup_dir.join(name);
            extracted.push(out_path.clone());
            let mut out = File::create(&out_path)?;
            io::copy(&mut entry, &mut out)?;
        }
        Ok(())
    }

    /// Check that `archive_name` can be restored from before anything is
    /// touched: a readable zip, every member a plain file name with intact
    /// data, and at least one `es_*.json` member. Returns the member names.
    pub fn verify(&self, archive_name: &str) -> Result<Vec<String>> {
        let invalid = |reason: String| LifecycleError::InvalidArchive {
            archive: archive_name.to_string(),
            reason,
        };

        let archive_path = self.existing_archive(archive_name)?;
        let mut archive = ZipArchive::new(File::open(&archive_path)?).map_err(|e| invalid(e.to_string()))?;
        let entries = self
            .plain_members(&mut archive)
            .map_err(|e| invalid(e.to_string()))?;
        if !entries.iter().any(|(_, name)| is_bulk_member(name)) {
            return Err(invalid("no es_*.json member to replay".to_string()));
        }

        // reading a member to the end checks its CRC
        for (index, name) in &entries {
            let mut entry = archive.by_index(*index).map_err(|e| invalid(e.to_string()))?;
            io::copy(&mut entry, &mut io::sink()).map_err(|e| invalid(format!("{}: {}", name, e)))?;
        }

        Ok(entries.into_iter().map(|(_, name)| name).collect())
    }

    /// Index and name of every file member. Fails on the first name that is
    /// not a plain file name.
    fn plain_members(&self, archive: &mut ZipArchive<File>) -> Result<Vec<(usize, String)>> {
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            self.member_path(&name)?;
            entries.push((index, name));
        }
        Ok(entries)
    }

    /// Manifest embedded in an archive, `None` for archives written without one.
    pub fn read_manifest(&self, archive_name: &str) -> Result<Option<BackupManifest>> {
        let archive_path = self.existing_archive(archive_name)?;
        let mut archive = ZipArchive::new(File::open(&archive_path)?)?;

        let entry = match archive.by_name(MANIFEST_MEMBER) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_reader(entry)?))
    }

    /// Archives in the backup directory, newest first.
    pub fn list(&self) -> Result<Vec<BackupRecord>> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut filenames: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        filenames.sort_by(|a, b| b.cmp(a));

        let mut records = Vec::new();
        for filename in filenames {
            let Some(mut record) = BackupRecord::from_filename(&filename, &self.prefix) else {
                continue;
            };
            match self.read_manifest(&filename) {
                Ok(Some(manifest)) => record.reason = Some(manifest.reason),
                Ok(None) => {}
                Err(e) => debug!(archive = %filename, error = %e, "Unreadable manifest, using file name"),
            }
            records.push(record);
        }
        Ok(records)
    }

    pub fn remove(&self, archive_name: &str) -> Result<()> {
        fs::remove_file(self.member_path(archive_name)?)?;
        Ok(())
    }

    fn existing_archive(&self, archive_name: &str) -> Result<PathBuf> {
        let path = self
            .member_path(archive_name)
            .map_err(|_| LifecycleError::BackupNotFound(archive_name.to_string()))?;
        if !path.is_file() {
            return Err(LifecycleError::BackupNotFound(archive_name.to_string()));
        }
        Ok(path)
    }

    /// Path of a file directly inside the backup directory. Names with
    /// directory components are rejected.
    fn member_path(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.backup_dir.join(name)),
            _ => Err(LifecycleError::Precondition(format!(
                "{:?} is not a plain file name",
                name
            ))),
        }
    }
}
