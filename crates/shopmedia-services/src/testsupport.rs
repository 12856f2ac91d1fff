//! In-memory `ImageStore` and fixture helpers for service tests.

use async_trait::async_trait;
use chrono::Utc;
use shopmedia_core::{AppError, ImageOwner, ImageRecord, NewImageRecord};
use shopmedia_db::ImageStore;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// A 32-bit RGBA PNG fixture.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    use image::{ImageFormat, Rgba, RgbaImage};
    let img = RgbaImage::from_pixel(width, height, Rgba([12, 34, 56, 255]));
    let mut buffer = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

/// Vec-backed store with the same row-level semantics as the Postgres
/// implementation, plus tampering helpers for drift scenarios.
pub struct MemoryImageStore {
    records: Mutex<Vec<ImageRecord>>,
    next_id: AtomicI64,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ImageRecord>> {
        self.records.lock().expect("store mutex poisoned")
    }

    /// Insert a record directly, bypassing the upload pipeline (simulates
    /// legacy/migrated rows).
    pub async fn insert_raw(
        &self,
        store_id: i64,
        product_id: Option<i64>,
        filename: &str,
        is_primary: bool,
    ) -> ImageRecord {
        let now = Utc::now();
        let record = ImageRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            store_id,
            product_id,
            filename: filename.to_string(),
            thumbnail_filename: None,
            is_primary,
            display_order: 0,
            created_at: now,
            updated_at: now,
        };
        self.lock().push(record.clone());
        record
    }

    /// Overwrite a filename column verbatim (simulates manual tampering).
    pub async fn overwrite_filename(&self, image_id: i64, filename: &str) {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == image_id)
            .expect("record exists");
        record.filename = filename.to_string();
    }

    /// Force the primary flag without the write-time invariant checks.
    pub async fn mark_primary_unchecked(&self, image_id: i64) {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == image_id)
            .expect("record exists");
        record.is_primary = true;
    }
}

fn matches_owner(record: &ImageRecord, owner: ImageOwner) -> bool {
    record.store_id == owner.store_id() && record.product_id == owner.product_id()
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord, AppError> {
        let now = Utc::now();
        let stored = ImageRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            store_id: record.store_id,
            product_id: record.product_id,
            filename: record.filename,
            thumbnail_filename: record.thumbnail_filename,
            is_primary: record.is_primary,
            display_order: record.display_order,
            created_at: now,
            updated_at: now,
        };
        self.lock().push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, image_id: i64) -> Result<Option<ImageRecord>, AppError> {
        Ok(self.lock().iter().find(|r| r.id == image_id).cloned())
    }

    async fn get_primary(&self, owner: ImageOwner) -> Result<Option<ImageRecord>, AppError> {
        Ok(self
            .lock()
            .iter()
            .find(|r| matches_owner(r, owner) && r.is_primary)
            .cloned())
    }

    async fn list_by_owner(&self, owner: ImageOwner) -> Result<Vec<ImageRecord>, AppError> {
        let mut out: Vec<ImageRecord> = self
            .lock()
            .iter()
            .filter(|r| matches_owner(r, owner))
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.display_order, r.id));
        Ok(out)
    }

    async fn list_all(&self) -> Result<Vec<ImageRecord>, AppError> {
        let mut out = self.lock().clone();
        out.sort_by_key(|r| r.id);
        Ok(out)
    }

    async fn set_primary(&self, owner: ImageOwner, image_id: i64) -> Result<(), AppError> {
        let mut records = self.lock();

        let belongs = records
            .iter()
            .any(|r| r.id == image_id && matches_owner(r, owner));
        if !belongs {
            return Err(AppError::NotFound(format!(
                "image {} for {}",
                image_id, owner
            )));
        }

        for record in records.iter_mut().filter(|r| matches_owner(r, owner)) {
            record.is_primary = record.id == image_id;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_display_order(
        &self,
        image_id: i64,
        display_order: i32,
    ) -> Result<(), AppError> {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == image_id)
            .ok_or_else(|| AppError::NotFound(format!("image {}", image_id)))?;
        record.display_order = display_order;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn repoint_filenames(
        &self,
        image_id: i64,
        filename: &str,
        thumbnail_filename: Option<&str>,
    ) -> Result<(), AppError> {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == image_id)
            .ok_or_else(|| AppError::NotFound(format!("image {}", image_id)))?;
        record.filename = filename.to_string();
        record.thumbnail_filename = thumbnail_filename.map(|s| s.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn clear_thumbnail(&self, image_id: i64) -> Result<(), AppError> {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == image_id)
            .ok_or_else(|| AppError::NotFound(format!("image {}", image_id)))?;
        record.thumbnail_filename = None;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, image_id: i64) -> Result<(), AppError> {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|r| r.id != image_id);
        if records.len() == before {
            return Err(AppError::NotFound(format!("image {}", image_id)));
        }
        Ok(())
    }
}
