//! Postgres implementation of [`ImageStore`] over the `store_images` table.
//!
//! Expected schema (owned by the storefront's migration pipeline):
//!
//! ```sql
//! CREATE TABLE store_images (
//!     id                 BIGSERIAL PRIMARY KEY,
//!     store_id           BIGINT NOT NULL,
//!     product_id         BIGINT,
//!     filename           TEXT NOT NULL,
//!     thumbnail_filename TEXT,
//!     is_primary         BOOLEAN NOT NULL DEFAULT FALSE,
//!     display_order      INTEGER NOT NULL DEFAULT 0,
//!     created_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at         TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```
//!
//! A store-owned image has `product_id IS NULL`; owner matching therefore
//! uses `IS NOT DISTINCT FROM` throughout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::ImageStore;
use shopmedia_core::{AppError, ImageOwner, ImageRecord, NewImageRecord};
use sqlx::{FromRow, PgPool, Postgres};

#[derive(Debug, FromRow)]
struct ImageRow {
    id: i64,
    store_id: i64,
    product_id: Option<i64>,
    filename: String,
    thumbnail_filename: Option<String>,
    is_primary: bool,
    display_order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ImageRow> for ImageRecord {
    fn from(row: ImageRow) -> Self {
        ImageRecord {
            id: row.id,
            store_id: row.store_id,
            product_id: row.product_id,
            filename: row.filename,
            thumbnail_filename: row.thumbnail_filename,
            is_primary: row.is_primary,
            display_order: row.display_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Postgres-backed image store.
#[derive(Clone)]
pub struct PgImageStore {
    pool: PgPool,
}

impl PgImageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageStore for PgImageStore {
    #[tracing::instrument(skip(self, record), fields(db.table = "store_images", db.operation = "insert"))]
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord, AppError> {
        let row = sqlx::query_as::<Postgres, ImageRow>(
            r#"
            INSERT INTO store_images (
                store_id, product_id, filename, thumbnail_filename,
                is_primary, display_order, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, now(), now())
            RETURNING id, store_id, product_id, filename, thumbnail_filename,
                      is_primary, display_order, created_at, updated_at
            "#,
        )
        .bind(record.store_id)
        .bind(record.product_id)
        .bind(&record.filename)
        .bind(&record.thumbnail_filename)
        .bind(record.is_primary)
        .bind(record.display_order)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get(&self, image_id: i64) -> Result<Option<ImageRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, ImageRow>(
            r#"
            SELECT id, store_id, product_id, filename, thumbnail_filename,
                   is_primary, display_order, created_at, updated_at
            FROM store_images
            WHERE id = $1
            "#,
        )
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn get_primary(&self, owner: ImageOwner) -> Result<Option<ImageRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, ImageRow>(
            r#"
            SELECT id, store_id, product_id, filename, thumbnail_filename,
                   is_primary, display_order, created_at, updated_at
            FROM store_images
            WHERE store_id = $1
              AND product_id IS NOT DISTINCT FROM $2
              AND is_primary = TRUE
            "#,
        )
        .bind(owner.store_id())
        .bind(owner.product_id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_by_owner(&self, owner: ImageOwner) -> Result<Vec<ImageRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, ImageRow>(
            r#"
            SELECT id, store_id, product_id, filename, thumbnail_filename,
                   is_primary, display_order, created_at, updated_at
            FROM store_images
            WHERE store_id = $1
              AND product_id IS NOT DISTINCT FROM $2
            ORDER BY display_order, id
            "#,
        )
        .bind(owner.store_id())
        .bind(owner.product_id())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_all(&self) -> Result<Vec<ImageRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, ImageRow>(
            r#"
            SELECT id, store_id, product_id, filename, thumbnail_filename,
                   is_primary, display_order, created_at, updated_at
            FROM store_images
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "store_images", db.operation = "set_primary"))]
    async fn set_primary(&self, owner: ImageOwner, image_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE store_images
            SET is_primary = FALSE, updated_at = now()
            WHERE store_id = $1
              AND product_id IS NOT DISTINCT FROM $2
              AND is_primary = TRUE
              AND id <> $3
            "#,
        )
        .bind(owner.store_id())
        .bind(owner.product_id())
        .bind(image_id)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query(
            r#"
            UPDATE store_images
            SET is_primary = TRUE, updated_at = now()
            WHERE id = $3
              AND store_id = $1
              AND product_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(owner.store_id())
        .bind(owner.product_id())
        .bind(image_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!(
                "image {} for {}",
                image_id, owner
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "store_images", db.operation = "update"))]
    async fn set_display_order(
        &self,
        image_id: i64,
        display_order: i32,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE store_images
            SET display_order = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(image_id)
        .bind(display_order)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("image {}", image_id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "store_images", db.operation = "update"))]
    async fn repoint_filenames(
        &self,
        image_id: i64,
        filename: &str,
        thumbnail_filename: Option<&str>,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE store_images
            SET filename = $2, thumbnail_filename = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(image_id)
        .bind(filename)
        .bind(thumbnail_filename)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("image {}", image_id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "store_images", db.operation = "update"))]
    async fn clear_thumbnail(&self, image_id: i64) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE store_images
            SET thumbnail_filename = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(image_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("image {}", image_id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "store_images", db.operation = "delete"))]
    async fn delete(&self, image_id: i64) -> Result<(), AppError> {
        let deleted = sqlx::query("DELETE FROM store_images WHERE id = $1")
            .bind(image_id)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("image {}", image_id)));
        }
        Ok(())
    }
}
