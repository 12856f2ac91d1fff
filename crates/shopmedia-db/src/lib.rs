//! Database repositories for the image data access layer
//!
//! The [`ImageStore`] trait is the persistence seam consumed by the service
//! layer; [`PgImageStore`] is its Postgres implementation over the
//! `store_images` table. The table itself is owned by the storefront's
//! migration pipeline (schema documented in `postgres.rs`).

pub mod postgres;
pub mod store;

// Re-export commonly used types
pub use postgres::PgImageStore;
pub use store::ImageStore;
