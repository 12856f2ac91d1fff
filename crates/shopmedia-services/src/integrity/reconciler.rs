//! Reconciler — applies corrective actions from an integrity diff.
//!
//! Rules, in order of importance: nothing is mutated under `DryRun`; every
//! deletion is preceded by a backup unless the caller explicitly opted out;
//! every item is re-checked against fresh filesystem/database state before
//! a destructive step (the scan snapshot may be stale under traffic); one
//! item's failure never aborts the batch; cancellation takes effect after
//! the current item, so the report is always a consistent prefix.

use chrono::Utc;
use shopmedia_core::{
    expected_path, paths, validate_ownership, AppError, ImageKind, ImageRecord,
};
use shopmedia_db::ImageStore;
use shopmedia_storage::{derive_thumbnail, ImageVault};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::report::{
    ActionOutcome, ActionReport, IntegrityDiff, ReconcileAction, ReconcileReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// List intended actions; mutate nothing.
    DryRun,
    /// Execute actions, sequentially, one item at a time.
    Apply,
}

/// What to do with records whose physical file is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DanglingPolicy {
    /// Report only. The default: deleting records is never implicit.
    Report,
    DeleteRecord,
    RestoreFromBackup,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// Copy files into the timestamped backup area before deleting them.
    /// Turning this off is the caller's explicit confirmation of
    /// unrecoverable deletion.
    pub backup: bool,
    pub dangling: DanglingPolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            backup: true,
            dangling: DanglingPolicy::Report,
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn ImageStore>,
    vault: ImageVault,
    backup_root: PathBuf,
    thumbnail_max_dim: u32,
}

fn basename(stored_name: &str) -> &str {
    stored_name.rsplit('/').next().unwrap_or(stored_name)
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ImageStore>,
        vault: ImageVault,
        backup_root: impl Into<PathBuf>,
        thumbnail_max_dim: u32,
    ) -> Self {
        Self {
            store,
            vault,
            backup_root: backup_root.into(),
            thumbnail_max_dim,
        }
    }

    /// Apply (or list, under `DryRun`) the corrective actions for `diff`.
    /// Actions run in severity order: cross-tenant repairs first, then
    /// orphans, dangling records, and thumbnail regeneration.
    #[tracing::instrument(skip(self, diff, cancel), fields(issues = diff.issue_count()))]
    pub async fn reconcile(
        &self,
        diff: &IntegrityDiff,
        policy: ReconcilePolicy,
        options: ReconcileOptions,
        cancel: &CancellationToken,
    ) -> ReconcileReport {
        let actions = plan_actions(diff, options);
        let mut report = ReconcileReport {
            dry_run: policy == ReconcilePolicy::DryRun,
            aborted: false,
            actions: Vec::with_capacity(actions.len()),
        };

        // one stamp per run keeps all of a run's backups together
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

        for action in actions {
            if policy == ReconcilePolicy::DryRun {
                report.actions.push(ActionReport {
                    action,
                    outcome: ActionOutcome::Planned,
                    backup_path: None,
                });
                continue;
            }

            if cancel.is_cancelled() {
                tracing::warn!(
                    completed = report.actions.len(),
                    "Reconcile cancelled; report covers the completed prefix"
                );
                report.aborted = true;
                break;
            }

            let (outcome, backup_path) = self.apply(&action, options, &stamp).await;
            if let ActionOutcome::Failed { ref reason } = outcome {
                tracing::error!(action = ?action, reason = %reason, "Reconcile action failed, continuing");
            }
            report.actions.push(ActionReport {
                action,
                outcome,
                backup_path,
            });
        }

        tracing::info!(
            dry_run = report.dry_run,
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            aborted = report.aborted,
            "Reconcile complete"
        );

        report
    }

    async fn apply(
        &self,
        action: &ReconcileAction,
        options: ReconcileOptions,
        stamp: &str,
    ) -> (ActionOutcome, Option<String>) {
        match action {
            ReconcileAction::DeleteOrphan { path } => self.delete_orphan(path, options, stamp).await,
            ReconcileAction::DeleteDanglingRecord { image_id } => {
                (self.delete_dangling(*image_id).await, None)
            }
            ReconcileAction::RestoreDanglingRecord {
                image_id,
                expected_path,
            } => self.restore_dangling(*image_id, expected_path).await,
            ReconcileAction::RelocateCrossTenant { image_id, from, to } => {
                (self.relocate_cross_tenant(*image_id, from, to).await, None)
            }
            ReconcileAction::ClearForeignThumbnail { image_id } => {
                (self.clear_foreign_thumbnail(*image_id).await, None)
            }
            ReconcileAction::RegenerateThumbnail { image_id, .. } => {
                (self.regenerate_thumbnail(*image_id).await, None)
            }
            ReconcileAction::ReportDanglingRecord { .. } => (
                ActionOutcome::Skipped {
                    reason: "dangling policy is report-only".to_string(),
                },
                None,
            ),
        }
    }

    async fn delete_orphan(
        &self,
        path: &str,
        options: ReconcileOptions,
        stamp: &str,
    ) -> (ActionOutcome, Option<String>) {
        match self.check_orphan_fresh(path).await {
            Ok(Some(reason)) => return (ActionOutcome::Skipped { reason }, None),
            Ok(None) => {}
            Err(e) => {
                return (
                    ActionOutcome::Failed {
                        reason: e.to_string(),
                    },
                    None,
                )
            }
        }

        let backup_path = if options.backup {
            match self.vault.backup(path, &self.backup_root, stamp).await {
                Ok(backup) => Some(backup.display().to_string()),
                Err(e) => {
                    return (
                        ActionOutcome::Failed {
                            reason: format!("backup before delete failed: {}", e),
                        },
                        None,
                    )
                }
            }
        } else {
            None
        };

        match self.vault.remove(path).await {
            Ok(()) => {
                tracing::info!(path, backup = ?backup_path, "Orphan deleted");
                (ActionOutcome::Succeeded, backup_path)
            }
            Err(e) => (
                ActionOutcome::Failed {
                    reason: e.to_string(),
                },
                backup_path,
            ),
        }
    }

    /// Re-check an orphan against fresh state: the file may have vanished,
    /// or a record referencing it may have appeared since the scan.
    async fn check_orphan_fresh(&self, path: &str) -> Result<Option<String>, AppError> {
        if !self.vault.exists(path).await? {
            return Ok(Some("file already absent".to_string()));
        }

        let base = basename(path);
        let records = self.store.list_all().await?;
        let claimed = records.iter().find(|r| {
            basename(&r.filename) == base
                || r.thumbnail_filename.as_deref().map(basename) == Some(base)
        });
        if let Some(record) = claimed {
            return Ok(Some(format!(
                "no longer orphaned: referenced by image {}",
                record.id
            )));
        }

        Ok(None)
    }

    async fn delete_dangling(&self, image_id: i64) -> ActionOutcome {
        let record = match self.fetch_fresh(image_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return ActionOutcome::Skipped {
                    reason: "record already deleted".to_string(),
                }
            }
            Err(e) => {
                return ActionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        // the file may have appeared since the scan
        if let Ok(rel) = expected_path(record.owner(), &record.filename, ImageKind::Original) {
            match self.vault.exists(&rel).await {
                Ok(true) => {
                    return ActionOutcome::Skipped {
                        reason: "file exists again; no longer dangling".to_string(),
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    return ActionOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        }

        match self.store.delete(image_id).await {
            Ok(()) => {
                tracing::info!(image_id, "Dangling record deleted");
                ActionOutcome::Succeeded
            }
            Err(e) => ActionOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    async fn restore_dangling(
        &self,
        image_id: i64,
        expected_rel: &str,
    ) -> (ActionOutcome, Option<String>) {
        match self.fetch_fresh(image_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return (
                    ActionOutcome::Skipped {
                        reason: "record already deleted".to_string(),
                    },
                    None,
                )
            }
            Err(e) => {
                return (
                    ActionOutcome::Failed {
                        reason: e.to_string(),
                    },
                    None,
                )
            }
        }

        let backup = match self.find_newest_backup(expected_rel).await {
            Ok(Some(backup)) => backup,
            Ok(None) => {
                return (
                    ActionOutcome::Skipped {
                        reason: "no backup available to restore from".to_string(),
                    },
                    None,
                )
            }
            Err(e) => {
                return (
                    ActionOutcome::Failed {
                        reason: e.to_string(),
                    },
                    None,
                )
            }
        };

        match self.vault.restore(&backup, expected_rel).await {
            Ok(()) => {
                tracing::info!(image_id, path = expected_rel, backup = %backup.display(), "Dangling record restored from backup");
                (
                    ActionOutcome::Succeeded,
                    Some(backup.display().to_string()),
                )
            }
            Err(e) => (
                ActionOutcome::Failed {
                    reason: e.to_string(),
                },
                Some(backup.display().to_string()),
            ),
        }
    }

    /// Newest backup copy of `rel_path`, scanning the timestamped run
    /// directories in reverse lexical (= reverse chronological) order.
    async fn find_newest_backup(&self, rel_path: &str) -> Result<Option<PathBuf>, AppError> {
        let mut stamps = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.backup_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                stamps.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        stamps.sort();

        for stamp in stamps.iter().rev() {
            let candidate = self.backup_root.join(stamp).join(rel_path);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn relocate_cross_tenant(&self, image_id: i64, from: &str, to: &str) -> ActionOutcome {
        let record = match self.fetch_fresh(image_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return ActionOutcome::Skipped {
                    reason: "record already deleted".to_string(),
                }
            }
            Err(e) => {
                return ActionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        let owner = record.owner();

        // the move target must belong to the record's declared owner before
        // anything is touched
        if let Err(e) = validate_ownership(owner, to) {
            return ActionOutcome::Failed {
                reason: format!("target path failed ownership validation: {}", e),
            };
        }

        match self.vault.exists(to).await {
            Ok(true) => {
                return ActionOutcome::Skipped {
                    reason: "target path already occupied".to_string(),
                }
            }
            Ok(false) => {}
            Err(e) => {
                return ActionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }

        if let Err(e) = self.vault.relocate(from, to).await {
            return ActionOutcome::Failed {
                reason: e.to_string(),
            };
        }

        // re-validate after the move before declaring success
        if let Err(e) = validate_ownership(owner, to) {
            return ActionOutcome::Failed {
                reason: format!("post-move ownership validation failed: {}", e),
            };
        }

        let new_filename = basename(to).to_string();
        let thumbnail = record
            .thumbnail_filename
            .as_deref()
            .map(basename)
            .map(str::to_string);
        if let Err(e) = self
            .store
            .repoint_filenames(image_id, &new_filename, thumbnail.as_deref())
            .await
        {
            return ActionOutcome::Failed {
                reason: format!("file moved but record repoint failed: {}", e),
            };
        }

        tracing::info!(image_id, from, to, "Cross-tenant mismatch repaired");
        ActionOutcome::Succeeded
    }

    /// A thumbnail column pointing into another tenant's tree: clear the
    /// reference (thumbnails are regenerable) and leave the foreign file
    /// alone — it may be that tenant's legitimate asset.
    async fn clear_foreign_thumbnail(&self, image_id: i64) -> ActionOutcome {
        match self.fetch_fresh(image_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return ActionOutcome::Skipped {
                    reason: "record already deleted".to_string(),
                }
            }
            Err(e) => {
                return ActionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }

        match self.store.clear_thumbnail(image_id).await {
            Ok(()) => {
                tracing::info!(image_id, "Foreign thumbnail reference cleared");
                ActionOutcome::Succeeded
            }
            Err(e) => ActionOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    async fn regenerate_thumbnail(&self, image_id: i64) -> ActionOutcome {
        let record = match self.fetch_fresh(image_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return ActionOutcome::Skipped {
                    reason: "record already deleted".to_string(),
                }
            }
            Err(e) => {
                return ActionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        let owner = record.owner();

        let original_rel = match expected_path(owner, &record.filename, ImageKind::Original) {
            Ok(rel) => rel,
            Err(e) => {
                return ActionOutcome::Skipped {
                    reason: format!("original unresolvable: {}", e),
                }
            }
        };

        let original = match self.vault.read(&original_rel).await {
            Ok(data) => data,
            Err(e) => {
                return ActionOutcome::Skipped {
                    reason: format!("original unreadable (record may be dangling): {}", e),
                }
            }
        };

        let base = basename(&record.filename).to_string();
        let thumb_rel = match paths::resolve(owner, &base, ImageKind::Thumbnail) {
            Ok(rel) => rel,
            Err(e) => {
                return ActionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let thumb_bytes = match derive_thumbnail(&original, self.thumbnail_max_dim) {
            Ok(bytes) => bytes,
            Err(e) => {
                return ActionOutcome::Failed {
                    reason: format!("derivation failed: {}", e),
                }
            }
        };

        if let Err(e) = self.vault.persist(&thumb_rel, &thumb_bytes).await {
            return ActionOutcome::Failed {
                reason: e.to_string(),
            };
        }

        if let Err(e) = self
            .store
            .repoint_filenames(image_id, &record.filename, Some(&base))
            .await
        {
            return ActionOutcome::Failed {
                reason: format!("thumbnail written but record update failed: {}", e),
            };
        }

        tracing::info!(image_id, path = %thumb_rel, "Thumbnail regenerated");
        ActionOutcome::Succeeded
    }

    async fn fetch_fresh(&self, image_id: i64) -> Result<Option<ImageRecord>, AppError> {
        self.store.get(image_id).await
    }
}

/// Expand a diff into concrete actions, severity-first.
fn plan_actions(diff: &IntegrityDiff, options: ReconcileOptions) -> Vec<ReconcileAction> {
    let mut actions = Vec::with_capacity(diff.issue_count());

    for mismatch in &diff.cross_tenant_mismatches {
        match mismatch.kind {
            ImageKind::Original => actions.push(ReconcileAction::RelocateCrossTenant {
                image_id: mismatch.image_id,
                from: mismatch.actual_path.clone(),
                to: mismatch.target_path.clone(),
            }),
            ImageKind::Thumbnail => actions.push(ReconcileAction::ClearForeignThumbnail {
                image_id: mismatch.image_id,
            }),
        }
    }

    for path in &diff.potential_orphans {
        actions.push(ReconcileAction::DeleteOrphan { path: path.clone() });
    }

    for dangling in &diff.dangling_records {
        actions.push(match options.dangling {
            DanglingPolicy::Report => ReconcileAction::ReportDanglingRecord {
                image_id: dangling.image_id,
                expected_path: dangling.expected_path.clone(),
            },
            DanglingPolicy::DeleteRecord => ReconcileAction::DeleteDanglingRecord {
                image_id: dangling.image_id,
            },
            DanglingPolicy::RestoreFromBackup => ReconcileAction::RestoreDanglingRecord {
                image_id: dangling.image_id,
                expected_path: dangling.expected_path.clone(),
            },
        });
    }

    for missing in &diff.missing_thumbnails {
        actions.push(ReconcileAction::RegenerateThumbnail {
            image_id: missing.image_id,
            expected_path: missing.expected_path.clone(),
        });
    }

    actions
}
