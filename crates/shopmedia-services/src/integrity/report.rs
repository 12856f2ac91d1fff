//! Diff and report types shared by the scanner and the reconciler.

use serde::Serialize;
use shopmedia_core::{ImageKind, ImageOwner};

/// A record whose expected physical file does not exist.
#[derive(Debug, Clone, Serialize)]
pub struct DanglingRecord {
    pub image_id: i64,
    /// The canonical path the file should occupy, or the raw stored value
    /// when it cannot be resolved at all.
    pub expected_path: String,
}

/// A record without a usable thumbnail: the reference is NULL (partial
/// write) or the referenced file is absent. Lower severity; thumbnails are
/// regenerable from the committed original.
#[derive(Debug, Clone, Serialize)]
pub struct MissingThumbnail {
    pub image_id: i64,
    pub expected_path: String,
}

/// A record whose file lives under a different owner's path than the record
/// declares. Highest severity; always reported, even in partial scans.
#[derive(Debug, Clone, Serialize)]
pub struct CrossTenantMismatch {
    pub image_id: i64,
    pub declared_owner: ImageOwner,
    pub kind: ImageKind,
    /// Where the file actually is (or what the stored column points at).
    pub actual_path: String,
    /// The canonical path implied by the declared owner.
    pub target_path: String,
}

/// Classified difference between the media tree and the image table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityDiff {
    /// Managed files accounted for by a record (originals and thumbnails).
    pub valid_system_images: usize,
    /// Files outside the canonical grammar. Counted, never touched.
    pub foreign_files: Vec<String>,
    /// Managed files no record references.
    pub potential_orphans: Vec<String>,
    pub dangling_records: Vec<DanglingRecord>,
    pub missing_thumbnails: Vec<MissingThumbnail>,
    pub cross_tenant_mismatches: Vec<CrossTenantMismatch>,
}

impl IntegrityDiff {
    /// True when the reconciler would have nothing to do.
    pub fn is_clean(&self) -> bool {
        self.potential_orphans.is_empty()
            && self.dangling_records.is_empty()
            && self.missing_thumbnails.is_empty()
            && self.cross_tenant_mismatches.is_empty()
    }

    pub fn issue_count(&self) -> usize {
        self.potential_orphans.len()
            + self.dangling_records.len()
            + self.missing_thumbnails.len()
            + self.cross_tenant_mismatches.len()
    }
}

/// One corrective action the reconciler intends to (or did) perform.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileAction {
    DeleteOrphan {
        path: String,
    },
    DeleteDanglingRecord {
        image_id: i64,
    },
    RestoreDanglingRecord {
        image_id: i64,
        expected_path: String,
    },
    RelocateCrossTenant {
        image_id: i64,
        from: String,
        to: String,
    },
    ClearForeignThumbnail {
        image_id: i64,
    },
    RegenerateThumbnail {
        image_id: i64,
        expected_path: String,
    },
    ReportDanglingRecord {
        image_id: i64,
        expected_path: String,
    },
}

/// Per-item outcome; an individual failure never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Dry-run only: the action that `Apply` would take.
    Planned,
    Succeeded,
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    #[serde(flatten)]
    pub action: ReconcileAction,
    #[serde(flatten)]
    pub outcome: ActionOutcome,
    /// Set when a backup copy was taken before a deletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}

/// Aggregated outcome of one reconcile run. Always a consistent prefix of
/// the planned actions: cancellation aborts after the current item.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub aborted: bool,
    pub actions: Vec<ActionReport>,
}

impl ReconcileReport {
    pub fn planned(&self) -> usize {
        self.count(|o| matches!(o, ActionOutcome::Planned))
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, ActionOutcome::Succeeded))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ActionOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ActionOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ActionOutcome) -> bool) -> usize {
        self.actions.iter().filter(|a| pred(&a.outcome)).count()
    }
}
