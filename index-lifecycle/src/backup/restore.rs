//! Replay of unpacked backup members against the bulk endpoint.

use super::bulk;
use crate::engine::SearchEngine;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Result of replaying one `es_*.json` member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayOutcome {
    pub member: String,
    /// Logical index name taken from `es_<index>-<YYYYMMDD>.json`
    pub index: String,
    pub items: usize,
    pub error: Option<String>,
}

/// Only `es_*.json` members hold bulk payloads.
pub fn is_bulk_member(name: &str) -> bool {
    name.starts_with("es_") && name.ends_with(".json")
}

fn member_index(name: &str) -> String {
    let stem = name
        .strip_prefix("es_")
        .and_then(|n| n.strip_suffix(".json"))
        .unwrap_or(name);
    stem.rsplit_once('-')
        .map_or(stem, |(index, _timestamp)| index)
        .to_string()
}

pub struct RestoreEngine<'a, E> {
    engine: &'a E,
    backup_dir: &'a Path,
}

impl<'a, E: SearchEngine> RestoreEngine<'a, E> {
    pub fn new(engine: &'a E, backup_dir: &'a Path) -> Self {
        Self { engine, backup_dir }
    }

    /// Replay every bulk member, deleting each unpacked file once handled.
    /// Non-bulk members (display exports, the manifest) are only deleted.
    pub async fn replay(&self, members: &[String]) -> Vec<ReplayOutcome> {
        let mut outcomes = Vec::new();

        for member in members {
            let path = self.backup_dir.join(member);

            if !is_bulk_member(member) {
                debug!(member = %member, "Discarding non-bulk member");
                remove(&path);
                continue;
            }

            info!(member = %member, "Restoring");
            let outcome = self.replay_member(member, &path).await;
            if let Some(error) = &outcome.error {
                warn!(member = %member, error = %error, "Restore of member failed");
            }
            remove(&path);
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn replay_member(&self, member: &str, path: &Path) -> ReplayOutcome {
        let mut outcome = ReplayOutcome {
            member: member.to_string(),
            index: member_index(member),
            items: 0,
            error: None,
        };

        let payload = match fs::read_to_string(path) {
            Ok(payload) => payload,
            Err(e) => {
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };
        if bulk::is_noop(&payload) {
            return outcome;
        }

        match self.engine.bulk(&payload).await {
            Ok(summary) => {
                outcome.items = summary.items;
                if summary.failed > 0 {
                    outcome.error = Some(format!(
                        "{} of {} documents rejected: {}",
                        summary.failed,
                        summary.items,
                        summary.first_error.unwrap_or_default()
                    ));
                }
            }
            Err(e) => outcome.error = Some(e.to_string()),
        }
        outcome
    }
}

fn remove(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(file = %path.display(), error = %e, "Failed to remove unpacked file");
    }
}
