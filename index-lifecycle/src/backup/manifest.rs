//! Backup metadata: reasons, the embedded manifest and listing records.
//!
//! Archives are named `<prefix>-<YYYYMMDD>[-<reason>].zip`. Newer archives also
//! carry a `backup-manifest.json` member so the reason does not have to be
//! recovered from the file name.

use crate::utils::errors::{LifecycleError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Name of the manifest member inside each archive.
pub const MANIFEST_MEMBER: &str = "backup-manifest.json";

/// Date format used in export and archive file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d";

/// Why a backup was taken. Only `Auto` backups are subject to rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackupReason {
    Auto,
    Update,
    Manual,
    Other(String),
}

impl BackupReason {
    pub fn as_str(&self) -> &str {
        match self {
            BackupReason::Auto => "auto",
            BackupReason::Update => "update",
            BackupReason::Manual => "manual",
            BackupReason::Other(reason) => reason,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, BackupReason::Auto)
    }
}

impl FromStr for BackupReason {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(LifecycleError::InvalidReason(s.to_string()));
        }

        Ok(match s {
            "auto" => BackupReason::Auto,
            "update" => BackupReason::Update,
            "manual" => BackupReason::Manual,
            other => BackupReason::Other(other.to_string()),
        })
    }
}

impl TryFrom<String> for BackupReason {
    type Error = LifecycleError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BackupReason> for String {
    fn from(reason: BackupReason) -> Self {
        reason.as_str().to_string()
    }
}

impl fmt::Display for BackupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document count of one exported index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexExport {
    pub name: String,
    pub documents: usize,
}

/// Backup manifest, serialized as `backup-manifest.json` inside each archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub version: u32,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// `YYYYMMDD`, as used in the file names
    pub timestamp: String,
    pub reason: BackupReason,
    pub host: String,
    pub members: Vec<String>,
    pub indices: Vec<IndexExport>,
}

impl BackupManifest {
    pub fn new(date: NaiveDate, reason: BackupReason, members: Vec<String>, indices: Vec<IndexExport>) -> Self {
        Self {
            version: 1,
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            timestamp: date.format(TIMESTAMP_FORMAT).to_string(),
            reason,
            host: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            members,
            indices,
        }
    }
}

/// Listing view of one archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub filename: String,
    pub timestamp: NaiveDate,
    /// `None` for legacy archives named without a reason
    pub reason: Option<BackupReason>,
}

impl BackupRecord {
    /// Parse `<prefix>-<YYYYMMDD>[-<reason>].zip`. Everything after the
    /// timestamp is the reason, dashes included.
    pub fn from_filename(filename: &str, prefix: &str) -> Option<Self> {
        let stem = filename
            .strip_suffix(".zip")?
            .strip_prefix(prefix)?
            .strip_prefix('-')?;

        let (timestamp, reason) = match stem.split_once('-') {
            Some((timestamp, reason)) => (timestamp, Some(reason.parse().ok()?)),
            None => (stem, None),
        };

        Some(Self {
            filename: filename.to_string(),
            timestamp: NaiveDate::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?,
            reason,
        })
    }

    pub fn is_auto(&self) -> bool {
        self.reason.as_ref().is_some_and(BackupReason::is_auto)
    }
}

/// `<prefix>-<YYYYMMDD>-<reason>.zip`
pub fn archive_name(prefix: &str, date: NaiveDate, reason: &BackupReason) -> String {
    format!("{}-{}-{}.zip", prefix, date.format(TIMESTAMP_FORMAT), reason)
}
