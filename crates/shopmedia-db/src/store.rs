//! Persistence seam for image records
//!
//! Services depend on this trait object rather than a concrete repository,
//! so serving, upload, and integrity flows stay backend-agnostic and
//! testable without a live database. Each method is a single row-level
//! atomic operation except `set_primary`, which is transactional.

use async_trait::async_trait;
use shopmedia_core::{AppError, ImageOwner, ImageRecord, NewImageRecord};

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Insert a new record; the store assigns id and timestamps.
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord, AppError>;

    async fn get(&self, image_id: i64) -> Result<Option<ImageRecord>, AppError>;

    /// The primary image for an owner, if one is marked.
    async fn get_primary(&self, owner: ImageOwner) -> Result<Option<ImageRecord>, AppError>;

    /// All images for an owner, ordered by `display_order` then id.
    async fn list_by_owner(&self, owner: ImageOwner) -> Result<Vec<ImageRecord>, AppError>;

    /// Every record, for the integrity scanner's enumeration pass.
    async fn list_all(&self) -> Result<Vec<ImageRecord>, AppError>;

    /// Mark `image_id` as the owner's primary image, clearing any previous
    /// primary in the same transaction. Fails with `NotFound` when the image
    /// does not belong to the owner.
    async fn set_primary(&self, owner: ImageOwner, image_id: i64) -> Result<(), AppError>;

    async fn set_display_order(&self, image_id: i64, display_order: i32)
        -> Result<(), AppError>;

    /// Repoint a record at a different physical basename (reconciliation
    /// only; uploads never rename records).
    async fn repoint_filenames(
        &self,
        image_id: i64,
        filename: &str,
        thumbnail_filename: Option<&str>,
    ) -> Result<(), AppError>;

    /// Null out the thumbnail reference after a failed derivation or a
    /// detected missing thumbnail.
    async fn clear_thumbnail(&self, image_id: i64) -> Result<(), AppError>;

    async fn delete(&self, image_id: i64) -> Result<(), AppError>;
}
