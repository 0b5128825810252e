//! Entry points consumed by schedulers and operator tooling.
//!
//! The orchestrator assumes exclusive access to its indices for the duration
//! of a call; serializing calls is the caller's job.

use crate::admin::{IndexAdmin, IndexProbe};
use crate::backup::manifest::{archive_name, TIMESTAMP_FORMAT};
use crate::backup::{
    bulk, ArchivePackager, BackupManifest, BackupReason, BackupRecord, CorpusScanner, IndexExport,
    RestoreEngine, RetentionManager,
};
use crate::config::Config;
use crate::engine::{EsClient, SearchEngine};
use crate::rebuild::Rebuilder;
use crate::report::{IndexAction, IndexOutcome, LifecycleReport, Operation, RunStatus};
use crate::schema::{validate, IndexDescriptor, SchemaSpec};
use crate::utils::errors::{LifecycleError, Result};
use chrono::{Local, NaiveDate};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, warn};

pub struct LifecycleOrchestrator<E> {
    engine: E,
    schema: SchemaSpec,
    config: Config,
}

impl LifecycleOrchestrator<EsClient> {
    /// Orchestrator talking to the configured cluster, with the schema
    /// resource named in the configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let schema = SchemaSpec::from_file(&config.schema.path)?;
        let engine = EsClient::new(&config.engine)?;
        Ok(Self::new(engine, schema, config))
    }
}

impl<E: SearchEngine> LifecycleOrchestrator<E> {
    pub fn new(engine: E, schema: SchemaSpec, config: Config) -> Self {
        Self { engine, schema, config }
    }

    #[cfg(test)]
    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    fn admin(&self) -> IndexAdmin<'_, E> {
        IndexAdmin::new(&self.engine, &self.config.schema.index_prefix)
    }

    fn packager(&self) -> ArchivePackager {
        ArchivePackager::new(self.config.backup_dir(), self.config.backup.archive_prefix.clone())
    }

    /// Validate, create or rebuild every configured index. With
    /// `force_restore` every index is deleted and recreated blank instead.
    pub async fn index_check(&self, force_restore: bool) -> LifecycleReport {
        let admin = self.admin();
        let mut report = LifecycleReport::new(Operation::IndexCheck);
        let mut pre_rebuild_backup: Option<std::result::Result<(), String>> = None;

        for descriptor in self.schema.indices() {
            let outcome = if force_restore {
                self.reset_index(&admin, descriptor).await
            } else {
                self.check_index(&admin, descriptor, &mut pre_rebuild_backup, &mut report)
                    .await
            };
            report.push(outcome);
        }

        report.finish()
    }

    async fn reset_index(&self, admin: &IndexAdmin<'_, E>, descriptor: &IndexDescriptor) -> IndexOutcome {
        let index = admin.physical_name(&descriptor.name);
        if let Err(e) = admin.delete(&index).await {
            return IndexOutcome::failed(&descriptor.name, IndexAction::Reset, e);
        }
        match admin.create(descriptor).await {
            Ok(()) => IndexOutcome::ok(&descriptor.name, IndexAction::Reset),
            Err(e) => IndexOutcome::failed(&descriptor.name, IndexAction::Reset, e),
        }
    }

    async fn check_index(
        &self,
        admin: &IndexAdmin<'_, E>,
        descriptor: &IndexDescriptor,
        pre_rebuild_backup: &mut Option<std::result::Result<(), String>>,
        report: &mut LifecycleReport,
    ) -> IndexOutcome {
        let name = &descriptor.name;
        let index = admin.physical_name(name);

        let live = match admin.probe(name).await {
            IndexProbe::Present(live) => live,
            IndexProbe::Absent => {
                info!(index = %index, "Creating new blank index");
                return match admin.create(descriptor).await {
                    Ok(()) => IndexOutcome::ok(name, IndexAction::Created),
                    Err(e) => IndexOutcome::failed(name, IndexAction::Created, e),
                };
            }
            IndexProbe::Unreachable(reason) => {
                return IndexOutcome::failed(
                    name,
                    IndexAction::Skipped,
                    format!("could not determine whether {} exists, left untouched: {}", index, reason),
                );
            }
        };

        let Some(drift) = validate(descriptor, &live) else {
            info!(index = %index, "Index is created and up to date");
            return IndexOutcome::ok(name, IndexAction::UpToDate);
        };

        // one full backup before the first rebuild of the batch
        let backup = match pre_rebuild_backup.clone() {
            Some(result) => result,
            None => {
                info!("Running backup before rebuild");
                let backup = self.backup_all_indexes(&BackupReason::Update).await;
                report.archive = backup.archive.clone();
                let result = match backup.status {
                    RunStatus::Failure => Err(backup.error.unwrap_or_else(|| "backup failed".to_string())),
                    _ => Ok(()),
                };
                *pre_rebuild_backup = Some(result.clone());
                result
            }
        };
        if let Err(e) = backup {
            warn!(index = %index, "Skipping rebuild, pre-rebuild backup failed");
            return IndexOutcome::failed(name, IndexAction::Rebuilt, format!("pre-rebuild backup failed: {}", e))
                .with_drift(Some(drift));
        }

        info!(index = %index, "Applying new mappings");
        match Rebuilder::new(admin).rebuild(descriptor).await {
            Ok(_) => IndexOutcome::ok(name, IndexAction::Rebuilt).with_drift(Some(drift)),
            Err(e) => IndexOutcome::failed(name, IndexAction::Rebuilt, e).with_drift(Some(drift)),
        }
    }

    /// Export every existing index into one archive tagged with `reason`.
    /// Automatic backups are rotated afterwards.
    pub async fn backup_all_indexes(&self, reason: &BackupReason) -> LifecycleReport {
        self.backup_on(Local::now().date_naive(), reason).await
    }

    async fn backup_on(&self, date: NaiveDate, reason: &BackupReason) -> LifecycleReport {
        let mut report = LifecycleReport::new(Operation::Backup);
        let packager = self.packager();
        if let Err(e) = packager.ensure_dir() {
            return report.abort(e);
        }

        let admin = self.admin();
        let scanner = CorpusScanner::new(
            &self.engine,
            self.config.backup.page_size,
            &self.config.backup.pit_keep_alive,
        );
        let timestamp = date.format(TIMESTAMP_FORMAT).to_string();
        let mut members: Vec<PathBuf> = Vec::new();
        let mut exports = Vec::new();

        for descriptor in self.schema.indices() {
            let name = &descriptor.name;
            let index = admin.physical_name(name);

            match admin.probe(name).await {
                IndexProbe::Present(_) => {}
                IndexProbe::Absent => {
                    report.push(IndexOutcome::ok(name, IndexAction::Skipped));
                    continue;
                }
                IndexProbe::Unreachable(cause) => {
                    report.push(IndexOutcome::failed(name, IndexAction::Exported, &cause));
                    packager.discard(&members);
                    return report.abort(format!("could not determine whether {} exists", index));
                }
            }

            match self
                .export_index(&scanner, &packager, name, &index, &timestamp, &mut members)
                .await
            {
                Ok(documents) => {
                    exports.push(IndexExport {
                        name: name.clone(),
                        documents,
                    });
                    report.push(IndexOutcome::ok(name, IndexAction::Exported).with_documents(documents));
                }
                Err(e) => {
                    let e = LifecycleError::Export {
                        index: name.clone(),
                        source: Box::new(e),
                    };
                    warn!(index = %index, error = %e, "Backup aborted");
                    report.push(IndexOutcome::failed(name, IndexAction::Exported, &e));
                    packager.discard(&members);
                    return report.abort(e);
                }
            }
        }

        let archive = archive_name(packager.prefix(), date, reason);
        let member_names = members
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect();
        let manifest = BackupManifest::new(date, reason.clone(), member_names, exports);
        if let Err(e) = packager.pack(&members, &archive, &manifest) {
            packager.discard(&members);
            return report.abort(e);
        }
        report.archive = Some(archive);

        if reason.is_auto() {
            match packager.list() {
                Ok(all) => {
                    let rotation = RetentionManager::new(&packager).rotate(&all, self.config.backup.rotate);
                    for failure in rotation.failures {
                        report.warn(format!("backup rotation: {}", failure));
                    }
                    report.rotated = rotation.removed;
                }
                Err(e) => {
                    warn!(error = %e, "Backup rotation failed");
                    report.warn(format!("backup rotation failed: {}", e));
                }
            }
        }

        report.finish()
    }

    /// Writes `es_<name>-<timestamp>.json` (bulk replay) and
    /// `ta_<name>-<timestamp>.json` (plain sources), recording each written
    /// file in `members` as soon as it exists.
    async fn export_index(
        &self,
        scanner: &CorpusScanner<'_, E>,
        packager: &ArchivePackager,
        name: &str,
        index: &str,
        timestamp: &str,
        members: &mut Vec<PathBuf>,
    ) -> Result<usize> {
        let documents = scanner.scan(index).await?;

        let payload = bulk::encode(&documents)?;
        members.push(packager.write_member(&format!("es_{}-{}.json", name, timestamp), payload.as_bytes())?);

        let sources: Vec<&Value> = documents.iter().map(|d| &d.source).collect();
        members.push(packager.write_member(
            &format!("ta_{}-{}.json", name, timestamp),
            &serde_json::to_vec(&sources)?,
        )?);

        Ok(documents.len())
    }

    /// Wipe every index back to the current schema and replay `filename`.
    pub async fn restore_from_backup(&self, filename: &str) -> LifecycleReport {
        let mut report = LifecycleReport::new(Operation::Restore);
        let packager = self.packager();
        if let Err(e) = packager.verify(filename) {
            warn!(archive = %filename, error = %e, "Refusing to restore");
            return report.abort(e);
        }
        report.archive = Some(filename.to_string());

        let reset = self.index_check(true).await;
        report.indices.extend(reset.indices);
        if reset.status != RunStatus::Success {
            return report.abort("schema reset failed, nothing was replayed");
        }

        let members = match packager.unpack(filename) {
            Ok(members) => members,
            Err(e) => return report.abort(e),
        };

        let replayed = RestoreEngine::new(&self.engine, packager.backup_dir())
            .replay(&members)
            .await;
        for outcome in replayed {
            let restored = match outcome.error {
                None => IndexOutcome::ok(&outcome.index, IndexAction::Restored),
                Some(e) => IndexOutcome::failed(&outcome.index, IndexAction::Restored, e),
            };
            report.push(restored.with_documents(outcome.items));
        }

        info!(archive = %filename, "Index restore finished");
        report.finish()
    }

    /// Archives available for restore, newest first.
    pub fn get_available_backups(&self) -> Result<Vec<BackupRecord>> {
        self.packager().list()
    }
}
