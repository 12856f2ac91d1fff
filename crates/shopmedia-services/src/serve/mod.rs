//! Serve resolver — maps "primary image of owner X" to one unambiguous
//! outcome.
//!
//! Replaces client-side URL-shape guessing: the caller gets exactly one of
//! a servable path, `NotFound`, or `Forbidden`, and maps the latter two to a
//! placeholder asset. Ownership mismatches are logged in full server-side
//! but never leak path or tenant detail to the requester.

use shopmedia_core::{expected_path, validate_ownership, AppError, ImageKind, ImageOwner};
use shopmedia_db::ImageStore;
use shopmedia_storage::ImageVault;
use std::sync::Arc;

/// Legacy locations probed when the canonical path is missing, strictly for
/// migration reads. Relative to the media root.
const LEGACY_PREFIXES: &[&str] = &["", "originals/"];

/// Outcome of a primary-image resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Relative path under the media root, safe to serve for this owner.
    Resolved { rel_path: String },
    /// No record, or no file at any permitted location. The caller serves a
    /// placeholder.
    NotFound,
    /// The record's file belongs to another tenant. Never served, never
    /// silently corrected.
    Forbidden,
}

#[derive(Clone)]
pub struct ServeResolver {
    store: Arc<dyn ImageStore>,
    vault: ImageVault,
}

impl ServeResolver {
    pub fn new(store: Arc<dyn ImageStore>, vault: ImageVault) -> Self {
        Self { store, vault }
    }

    /// Resolve the primary original for `owner`.
    #[tracing::instrument(skip(self), fields(owner = %owner))]
    pub async fn resolve_primary(&self, owner: ImageOwner) -> Result<ServeOutcome, AppError> {
        let Some(record) = self.store.get_primary(owner).await? else {
            return Ok(ServeOutcome::NotFound);
        };
        self.resolve_stored(owner, record.id, &record.filename, ImageKind::Original)
            .await
    }

    /// Resolve the primary thumbnail for `owner`. A record without a derived
    /// thumbnail resolves to `NotFound` (the caller may fall back to the
    /// original or a placeholder).
    #[tracing::instrument(skip(self), fields(owner = %owner))]
    pub async fn resolve_primary_thumbnail(
        &self,
        owner: ImageOwner,
    ) -> Result<ServeOutcome, AppError> {
        let Some(record) = self.store.get_primary(owner).await? else {
            return Ok(ServeOutcome::NotFound);
        };
        let Some(thumbnail) = record.thumbnail_filename.clone() else {
            return Ok(ServeOutcome::NotFound);
        };
        self.resolve_stored(owner, record.id, &thumbnail, ImageKind::Thumbnail)
            .await
    }

    /// Read the resolved primary's bytes, or `None` on not-found/forbidden.
    /// Convenience for callers that do not stream.
    pub async fn fetch_primary(&self, owner: ImageOwner) -> Result<Option<Vec<u8>>, AppError> {
        match self.resolve_primary(owner).await? {
            ServeOutcome::Resolved { rel_path } => Ok(Some(self.vault.read(&rel_path).await?)),
            ServeOutcome::NotFound | ServeOutcome::Forbidden => Ok(None),
        }
    }

    async fn resolve_stored(
        &self,
        owner: ImageOwner,
        image_id: i64,
        stored_name: &str,
        kind: ImageKind,
    ) -> Result<ServeOutcome, AppError> {
        let rel_path = match expected_path(owner, stored_name, kind) {
            Ok(rel_path) => rel_path,
            Err(err @ AppError::OwnershipMismatch { .. }) => {
                tracing::error!(
                    image_id,
                    owner = %owner,
                    error = %err,
                    "Refusing to serve image whose stored reference belongs to another tenant"
                );
                return Ok(ServeOutcome::Forbidden);
            }
            Err(err @ AppError::UnrecognizedPath(_)) => {
                tracing::error!(
                    image_id,
                    owner = %owner,
                    error = %err,
                    "Refusing to serve image with unparseable stored reference"
                );
                return Ok(ServeOutcome::Forbidden);
            }
            Err(AppError::InvalidFilename(reason)) => {
                tracing::warn!(image_id, reason = %reason, "Record filename cannot reference a managed file");
                return Ok(ServeOutcome::NotFound);
            }
            Err(other) => return Err(other),
        };

        // belt and braces: the path we are about to serve must re-validate
        // against the requested owner
        if let Err(err) = validate_ownership(owner, &rel_path) {
            tracing::error!(image_id, owner = %owner, error = %err, "Resolved path failed ownership validation");
            return Ok(ServeOutcome::Forbidden);
        }

        if self.vault.exists(&rel_path).await? {
            return Ok(ServeOutcome::Resolved { rel_path });
        }

        // bounded legacy-location probes, originals only, reads only; the
        // canonical target above is what ownership was validated against
        if kind == ImageKind::Original && !stored_name.contains('/') {
            for prefix in LEGACY_PREFIXES {
                let candidate = format!("{}{}", prefix, stored_name);
                if self.vault.exists(&candidate).await? {
                    tracing::info!(
                        image_id,
                        legacy_path = %candidate,
                        canonical_path = %rel_path,
                        "Serving legacy location pending migration"
                    );
                    return Ok(ServeOutcome::Resolved {
                        rel_path: candidate,
                    });
                }
            }
        }

        Ok(ServeOutcome::NotFound)
    }
}
