//! Custom error types for the index lifecycle core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Search engine returned {status} for {operation}: {body}")]
    Upstream {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid backup reason: {0:?}")]
    InvalidReason(String),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Backup archive {archive} cannot be restored: {reason}")]
    InvalidArchive { archive: String, reason: String },

    #[error("Export of {index} failed: {source}")]
    Export {
        index: String,
        #[source]
        source: Box<LifecycleError>,
    },

    #[error("Rebuild of {index} stopped after {stage}: {source}")]
    Rebuild {
        index: String,
        stage: String,
        #[source]
        source: Box<LifecycleError>,
    },

    #[error("{0}")]
    Precondition(String),
}

impl LifecycleError {
    pub(crate) fn upstream(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        LifecycleError::Upstream {
            operation: operation.into(),
            status,
            body: body.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
