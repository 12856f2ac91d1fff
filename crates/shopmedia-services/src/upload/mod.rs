//! Upload service — the storage writer.
//!
//! Writes an uploaded image (original + derived thumbnail) to its canonical
//! location and persists the referencing record. The physical write and the
//! record insert are not one transaction (cross-system); the integrity
//! scanner repairs either side independently.

use chrono::Utc;
use shopmedia_core::{
    expected_path, paths, validate_ownership, AppError, ImageKind, ImageOwner, ImageRecord,
    NewImageRecord,
};
use shopmedia_db::ImageStore;
use shopmedia_storage::{derive_thumbnail, extension_for, sniff_format, ImageVault};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn ImageStore>,
    vault: ImageVault,
    thumbnail_max_dim: u32,
}

impl UploadService {
    pub fn new(store: Arc<dyn ImageStore>, vault: ImageVault, thumbnail_max_dim: u32) -> Self {
        Self {
            store,
            vault,
            thumbnail_max_dim,
        }
    }

    /// Generate a unique storage filename. Client-supplied names are never
    /// final; uniqueness comes from a millisecond timestamp plus a UUIDv4,
    /// which also makes basename matching in the scanner collision-safe.
    fn generate_filename(extension: &str) -> String {
        format!(
            "{}-{}.{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            extension
        )
    }

    /// Store an uploaded image for `owner`.
    ///
    /// The bytes must decode as a supported raster format. The original is
    /// committed through the vault's atomic protocol before the record is
    /// inserted. Thumbnail derivation failures after the original commit
    /// degrade the record (`thumbnail_filename = NULL`) instead of failing
    /// the upload; thumbnails are regenerable artifacts.
    #[tracing::instrument(skip(self, data), fields(owner = %owner, size_bytes = data.len()))]
    pub async fn store(
        &self,
        owner: ImageOwner,
        data: &[u8],
        with_thumbnail: bool,
    ) -> Result<ImageRecord, AppError> {
        let format = sniff_format(data)?;
        shopmedia_storage::thumbnail::validate_image(data)?;

        let filename = Self::generate_filename(extension_for(format));
        let original_rel = paths::resolve(owner, &filename, ImageKind::Original)?;

        // pre-write check: the path about to be written must belong to the
        // claimed owner
        validate_ownership(owner, &original_rel)?;

        self.vault.persist(&original_rel, data).await?;

        let thumbnail_filename = if with_thumbnail {
            match self.derive_and_persist_thumbnail(owner, &filename).await {
                Ok(()) => Some(filename.clone()),
                Err(e) => {
                    tracing::warn!(
                        error = %AppError::PartialWrite(e.to_string()),
                        filename = %filename,
                        "Thumbnail derivation failed after original commit; record degrades to no thumbnail"
                    );
                    None
                }
            }
        } else {
            None
        };

        let display_order = self.store.list_by_owner(owner).await?.len() as i32;

        let record = self
            .store
            .insert(NewImageRecord {
                store_id: owner.store_id(),
                product_id: owner.product_id(),
                filename,
                thumbnail_filename,
                is_primary: false,
                display_order,
            })
            .await?;

        tracing::info!(image_id = record.id, "Image stored");

        Ok(record)
    }

    /// Derive the thumbnail from the already-committed original (not the
    /// upload buffer) and write it through the same atomic protocol. The
    /// thumbnail shares the original's basename, in the `thumbnails/`
    /// sub-folder.
    async fn derive_and_persist_thumbnail(
        &self,
        owner: ImageOwner,
        filename: &str,
    ) -> Result<(), AppError> {
        let original_rel = paths::resolve(owner, filename, ImageKind::Original)?;
        let committed = self.vault.read(&original_rel).await?;

        let thumb_bytes = derive_thumbnail(&committed, self.thumbnail_max_dim)?;

        let thumb_rel = paths::resolve(owner, filename, ImageKind::Thumbnail)?;
        validate_ownership(owner, &thumb_rel)?;
        self.vault.persist(&thumb_rel, &thumb_bytes).await?;

        Ok(())
    }

    /// Mark an image as its owner's primary. The previous primary is cleared
    /// in the same transaction, and the record's resolved path is
    /// ownership-checked first so a mismatched record can never be promoted.
    #[tracing::instrument(skip(self), fields(owner = %owner))]
    pub async fn set_primary(&self, owner: ImageOwner, image_id: i64) -> Result<(), AppError> {
        let record = self
            .store
            .get(image_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("image {}", image_id)))?;

        let rel = expected_path(owner, &record.filename, ImageKind::Original)?;
        validate_ownership(owner, &rel)?;

        self.store.set_primary(owner, image_id).await
    }

    /// Delete an image: physical files first (idempotent), then the record,
    /// mirroring the tolerance order of scheduled cleanup — a half-deleted
    /// pair is repairable by the scanner.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, image_id: i64) -> Result<(), AppError> {
        let record = self
            .store
            .get(image_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("image {}", image_id)))?;

        let owner = record.owner();

        if let Some(ref thumb) = record.thumbnail_filename {
            match expected_path(owner, thumb, ImageKind::Thumbnail) {
                Ok(rel) => self.vault.remove(&rel).await?,
                Err(e) => {
                    tracing::warn!(image_id, error = %e, "Skipping thumbnail removal for unresolvable reference")
                }
            }
        }

        match expected_path(owner, &record.filename, ImageKind::Original) {
            Ok(rel) => self.vault.remove(&rel).await?,
            Err(e) => {
                tracing::warn!(image_id, error = %e, "Skipping original removal for unresolvable reference")
            }
        }

        self.store.delete(image_id).await
    }
}
