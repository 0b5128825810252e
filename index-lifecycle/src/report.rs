//! Structured results handed back to callers of the lifecycle entry points.

use crate::schema::SchemaDrift;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    IndexCheck,
    Backup,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Failure,
}

/// What was done, or attempted, for one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexAction {
    UpToDate,
    Created,
    Rebuilt,
    /// Deleted and recreated blank from the current schema
    Reset,
    Exported,
    /// Not present, nothing to do
    Skipped,
    Restored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexOutcome {
    pub index: String,
    pub action: IndexAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<SchemaDrift>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexOutcome {
    pub fn ok(index: &str, action: IndexAction) -> Self {
        Self {
            index: index.to_string(),
            action,
            documents: None,
            drift: None,
            error: None,
        }
    }

    pub fn failed(index: &str, action: IndexAction, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::ok(index, action)
        }
    }

    pub fn with_documents(mut self, documents: usize) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn with_drift(mut self, drift: Option<SchemaDrift>) -> Self {
        self.drift = drift;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleReport {
    pub operation: Operation,
    pub status: RunStatus,
    pub indices: Vec<IndexOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rotated: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Set when the run was aborted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LifecycleReport {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            status: RunStatus::Success,
            indices: Vec::new(),
            archive: None,
            rotated: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn push(&mut self, outcome: IndexOutcome) {
        self.indices.push(outcome);
    }

    pub fn warn(&mut self, warning: impl ToString) {
        self.warnings.push(warning.to_string());
    }

    /// Abort the run with `error` and settle the status.
    pub fn abort(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self.finish()
    }

    /// Derive the status from what was recorded.
    pub fn finish(mut self) -> Self {
        let failed = self.indices.iter().filter(|o| !o.is_ok()).count();
        self.status = if self.error.is_some() || (failed > 0 && failed == self.indices.len()) {
            RunStatus::Failure
        } else if failed > 0 || !self.warnings.is_empty() {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
        self
    }

    /// Names of indices whose handling failed.
    pub fn affected(&self) -> Vec<&str> {
        self.indices
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.index.as_str())
            .collect()
    }
}
