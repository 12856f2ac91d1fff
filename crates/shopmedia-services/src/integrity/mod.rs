//! Integrity scanning and reconciliation.
//!
//! One scanner/reconciler pair with an explicit policy argument replaces the
//! family of one-off filesystem/database repair scripts this system grew out
//! of. The scanner is read-only and safe under traffic; the reconciler
//! mutates only under `Apply`, re-checks every item against fresh state
//! before acting, and backs up before it deletes.

pub mod reconciler;
pub mod report;
pub mod scanner;

pub use reconciler::{DanglingPolicy, ReconcileOptions, ReconcilePolicy, Reconciler};
pub use report::{
    ActionOutcome, ActionReport, CrossTenantMismatch, DanglingRecord, IntegrityDiff,
    MissingThumbnail, ReconcileAction, ReconcileReport,
};
pub use scanner::IntegrityScanner;
