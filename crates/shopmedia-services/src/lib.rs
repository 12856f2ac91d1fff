//! Shopmedia Services Library
//!
//! Orchestration over the vault and the image store:
//!
//! - [`upload::UploadService`] — the storage writer: unique name generation,
//!   decode validation, pre-write ownership checks, atomic original write,
//!   best-effort thumbnail derivation.
//! - [`serve::ServeResolver`] — resolves an owner's primary image to a
//!   servable path or a typed not-found/forbidden outcome.
//! - [`integrity`] — the scanner/reconciler pair that detects and repairs
//!   drift between the media tree and the `store_images` table.

pub mod integrity;
pub mod serve;
pub mod upload;

#[cfg(test)]
pub(crate) mod testsupport;

// Re-export commonly used types
pub use integrity::{
    DanglingPolicy, IntegrityDiff, IntegrityScanner, ReconcileOptions, ReconcilePolicy,
    ReconcileReport, Reconciler,
};
pub use serve::{ServeOutcome, ServeResolver};
pub use upload::UploadService;
