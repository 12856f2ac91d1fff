use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which rendition of an image a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Original,
    Thumbnail,
}

/// The store, or store+product pair, an image belongs to.
///
/// A product image's store is its product's store; `store_id` is therefore
/// always present, directly or transitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImageOwner {
    Store { store_id: i64 },
    Product { store_id: i64, product_id: i64 },
}

impl ImageOwner {
    pub fn store(store_id: i64) -> Self {
        ImageOwner::Store { store_id }
    }

    pub fn product(store_id: i64, product_id: i64) -> Self {
        ImageOwner::Product {
            store_id,
            product_id,
        }
    }

    /// The owning tenant, for both variants.
    pub fn store_id(&self) -> i64 {
        match *self {
            ImageOwner::Store { store_id } => store_id,
            ImageOwner::Product { store_id, .. } => store_id,
        }
    }

    pub fn product_id(&self) -> Option<i64> {
        match *self {
            ImageOwner::Store { .. } => None,
            ImageOwner::Product { product_id, .. } => Some(product_id),
        }
    }
}

impl std::fmt::Display for ImageOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ImageOwner::Store { store_id } => write!(f, "store {}", store_id),
            ImageOwner::Product {
                store_id,
                product_id,
            } => write!(f, "store {} product {}", store_id, product_id),
        }
    }
}

/// One stored image (store image or product image).
///
/// `filename` and `thumbnail_filename` are base names only, never containing
/// directory components. The on-disk location is always derived from
/// `(owner, filename)` through the path grammar, never read back from a
/// stored path column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: i64,
    pub store_id: i64,
    pub product_id: Option<i64>,
    pub filename: String,
    pub thumbnail_filename: Option<String>,
    /// At most one record per owner may be primary; enforced transactionally
    /// at write time, not by convention.
    pub is_primary: bool,
    /// Presentation order among an owner's images; not necessarily unique.
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn owner(&self) -> ImageOwner {
        match self.product_id {
            Some(product_id) => ImageOwner::product(self.store_id, product_id),
            None => ImageOwner::store(self.store_id),
        }
    }
}

/// Insert payload for a new image; id and timestamps are assigned by the
/// persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewImageRecord {
    pub store_id: i64,
    pub product_id: Option<i64>,
    pub filename: String,
    pub thumbnail_filename: Option<String>,
    pub is_primary: bool,
    pub display_order: i32,
}

impl NewImageRecord {
    pub fn owner(&self) -> ImageOwner {
        match self.product_id {
            Some(product_id) => ImageOwner::product(self.store_id, product_id),
            None => ImageOwner::store(self.store_id),
        }
    }
}
