//! Canonical storage paths for store and product images.
//!
//! Path grammar (single source of truth, parsed back by the integrity
//! scanner):
//!
//! - `stores/{store_id}/{filename}`
//! - `stores/{store_id}/thumbnails/{filename}`
//! - `stores/{store_id}/products/{product_id}/{filename}`
//! - `stores/{store_id}/products/{product_id}/thumbnails/{filename}`
//!
//! Resolution is pure and deterministic: no hidden state, no I/O. Paths are
//! always relative, `/`-separated, and derived from the declared owner —
//! never trusted verbatim from client input or from a database column.

use regex::Regex;

use crate::error::AppError;
use crate::models::{ImageKind, ImageOwner};

/// Top-level directory for all tenant-owned images.
pub const STORES_DIR: &str = "stores";

/// Per-store directory holding product-owned images.
pub const PRODUCTS_DIR: &str = "products";

/// Sub-directory holding derived thumbnails, at the same level as originals.
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// Maximum length for stored filenames (255 characters)
pub const MAX_FILENAME_LENGTH: usize = 255;

/// A physical path decomposed back into its owner, filename, and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub store_id: i64,
    pub product_id: Option<i64>,
    pub filename: String,
    pub kind: ImageKind,
}

impl ParsedPath {
    pub fn owner(&self) -> ImageOwner {
        match self.product_id {
            Some(product_id) => ImageOwner::product(self.store_id, product_id),
            None => ImageOwner::store(self.store_id),
        }
    }
}

/// Validate a stored filename.
///
/// Rules:
/// - Must not be empty or exceed 255 characters
/// - Must not start with a dot
/// - Must match `^[A-Za-z0-9][A-Za-z0-9._-]*$` (no separators, no `..`
///   escapes, ASCII only)
pub fn validate_filename(filename: &str) -> Result<(), AppError> {
    if filename.is_empty() {
        return Err(AppError::InvalidFilename(
            "filename cannot be empty".to_string(),
        ));
    }

    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(AppError::InvalidFilename(format!(
            "filename exceeds maximum length of {} characters",
            MAX_FILENAME_LENGTH
        )));
    }

    let pattern = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").map_err(|e| {
        AppError::Internal(format!("Failed to compile filename validation regex: {}", e))
    })?;

    if !pattern.is_match(filename) {
        return Err(AppError::InvalidFilename(format!(
            "filename '{}' contains invalid characters. Allowed: letters, digits, dot, underscore, hyphen; no leading dot, no separators",
            filename
        )));
    }

    Ok(())
}

/// Resolve the canonical relative path for an image.
///
/// Deterministic and total for every valid filename; rejects malformed
/// filenames with `InvalidFilename` before any I/O can happen downstream.
pub fn resolve(owner: ImageOwner, filename: &str, kind: ImageKind) -> Result<String, AppError> {
    validate_filename(filename)?;

    let path = match (owner, kind) {
        (ImageOwner::Store { store_id }, ImageKind::Original) => {
            format!("{}/{}/{}", STORES_DIR, store_id, filename)
        }
        (ImageOwner::Store { store_id }, ImageKind::Thumbnail) => {
            format!("{}/{}/{}/{}", STORES_DIR, store_id, THUMBNAILS_DIR, filename)
        }
        (
            ImageOwner::Product {
                store_id,
                product_id,
            },
            ImageKind::Original,
        ) => format!(
            "{}/{}/{}/{}/{}",
            STORES_DIR, store_id, PRODUCTS_DIR, product_id, filename
        ),
        (
            ImageOwner::Product {
                store_id,
                product_id,
            },
            ImageKind::Thumbnail,
        ) => format!(
            "{}/{}/{}/{}/{}/{}",
            STORES_DIR, store_id, PRODUCTS_DIR, product_id, THUMBNAILS_DIR, filename
        ),
    };

    Ok(path)
}

/// Parse a relative path back into `(store_id, product_id, filename, kind)`.
///
/// The inverse of [`resolve`]. Paths that do not match the canonical grammar
/// fail with `UnrecognizedPath`, which classifies the file as
/// foreign/protected: the scanner counts it but the reconciler never touches
/// it.
pub fn parse(relative_path: &str) -> Result<ParsedPath, AppError> {
    let unrecognized = || AppError::UnrecognizedPath(relative_path.to_string());

    if relative_path.contains('\\') {
        return Err(unrecognized());
    }

    let segments: Vec<&str> = relative_path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(unrecognized());
    }

    if segments.first() != Some(&STORES_DIR) {
        return Err(unrecognized());
    }

    let store_id =
        parse_id(segments.get(1).copied().ok_or_else(unrecognized)?).ok_or_else(unrecognized)?;

    let (product_id, rest) = match segments.get(2) {
        Some(&seg) if seg == PRODUCTS_DIR => {
            let product_id = parse_id(segments.get(3).copied().ok_or_else(unrecognized)?)
                .ok_or_else(unrecognized)?;
            (Some(product_id), &segments[4..])
        }
        Some(_) => (None, &segments[2..]),
        None => return Err(unrecognized()),
    };

    let (kind, filename) = match rest {
        [name] => (ImageKind::Original, *name),
        [dir, name] if *dir == THUMBNAILS_DIR => (ImageKind::Thumbnail, *name),
        _ => return Err(unrecognized()),
    };

    if validate_filename(filename).is_err() {
        return Err(unrecognized());
    }

    Ok(ParsedPath {
        store_id,
        product_id,
        filename: filename.to_string(),
        kind,
    })
}

/// Parse a positive decimal id segment. Rejects signs, leading zeros are
/// accepted (directory names are produced by us and never carry them, but a
/// legacy tree might).
fn parse_id(segment: &str) -> Option<i64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse::<i64>().ok().filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_store_paths() {
        let owner = ImageOwner::store(4);
        assert_eq!(
            resolve(owner, "a.jpg", ImageKind::Original).unwrap(),
            "stores/4/a.jpg"
        );
        assert_eq!(
            resolve(owner, "a.jpg", ImageKind::Thumbnail).unwrap(),
            "stores/4/thumbnails/a.jpg"
        );
    }

    #[test]
    fn test_resolve_product_paths() {
        let owner = ImageOwner::product(4, 11);
        assert_eq!(
            resolve(owner, "a.jpg", ImageKind::Original).unwrap(),
            "stores/4/products/11/a.jpg"
        );
        assert_eq!(
            resolve(owner, "a.jpg", ImageKind::Thumbnail).unwrap(),
            "stores/4/products/11/thumbnails/a.jpg"
        );
    }

    #[test]
    fn test_roundtrip_law() {
        let owners = [
            ImageOwner::store(1),
            ImageOwner::store(987654321),
            ImageOwner::product(4, 11),
            ImageOwner::product(42, 1),
        ];
        let filenames = ["a.jpg", "1700000000000-0af1b2.webp", "x_y-z.PNG"];
        let kinds = [ImageKind::Original, ImageKind::Thumbnail];

        for owner in owners {
            for filename in filenames {
                for kind in kinds {
                    let path = resolve(owner, filename, kind).unwrap();
                    let parsed = parse(&path).unwrap();
                    assert_eq!(parsed.owner(), owner, "path {}", path);
                    assert_eq!(parsed.filename, filename, "path {}", path);
                    assert_eq!(parsed.kind, kind, "path {}", path);
                }
            }
        }
    }

    #[test]
    fn test_invalid_filenames_rejected() {
        let bad = [
            "",
            "../evil.jpg",
            "a/../b.jpg",
            "dir/name.jpg",
            ".hidden.jpg",
            "..",
            "name\\evil.jpg",
            "spaced name.jpg",
            "caf\u{e9}.jpg",
        ];
        for filename in bad {
            for kind in [ImageKind::Original, ImageKind::Thumbnail] {
                let result = resolve(ImageOwner::store(4), filename, kind);
                assert!(
                    matches!(result, Err(AppError::InvalidFilename(_))),
                    "expected InvalidFilename for {:?}",
                    filename
                );
            }
        }
    }

    #[test]
    fn test_filename_too_long_rejected() {
        let long = "a".repeat(MAX_FILENAME_LENGTH + 1);
        assert!(matches!(
            validate_filename(&long),
            Err(AppError::InvalidFilename(_))
        ));
        let ok = "a".repeat(MAX_FILENAME_LENGTH);
        assert!(validate_filename(&ok).is_ok());
    }

    #[test]
    fn test_parse_rejects_foreign_paths() {
        let foreign = [
            "uploads/a.jpg",
            "stores",
            "stores/4",
            "stores/abc/a.jpg",
            "stores/-4/a.jpg",
            "stores/0/a.jpg",
            "stores/4/products/x/a.jpg",
            "stores/4/products/11",
            "stores/4/products/11/thumbnails/sub/a.jpg",
            "stores/4/other/11/a.jpg",
            "stores/4//a.jpg",
            "/stores/4/a.jpg",
            "stores/4/.hidden",
            "stores/4/products/11/thumbnails/",
        ];
        for path in foreign {
            assert!(
                matches!(parse(path), Err(AppError::UnrecognizedPath(_))),
                "expected UnrecognizedPath for {:?}",
                path
            );
        }
    }

    #[test]
    fn test_parse_thumbnail_dir_vs_filename() {
        // a file literally named "thumbnails" at the store level parses as an
        // original; only a fourth segment makes it a thumbnail
        let parsed = parse("stores/4/thumbnails").unwrap();
        assert_eq!(parsed.kind, ImageKind::Original);
        assert_eq!(parsed.filename, "thumbnails");

        let parsed = parse("stores/4/thumbnails/t.jpg").unwrap();
        assert_eq!(parsed.kind, ImageKind::Thumbnail);
        assert_eq!(parsed.filename, "t.jpg");
    }
}
