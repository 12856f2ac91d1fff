//! Ownership validation
//!
//! The control that prevents cross-tenant image leakage: a resolved path's
//! embedded owner ids must match the owner a record declares, both before a
//! write lands on disk and before a file is served. Any difference is a hard
//! failure, never coerced.

use crate::error::AppError;
use crate::models::{ImageKind, ImageOwner};
use crate::paths;

/// Check that `relative_path` belongs to `owner`.
///
/// Parses the path through the canonical grammar and compares the embedded
/// store/product ids against the declared owner. Returns
/// `OwnershipMismatch` on any difference; paths outside the grammar fail
/// with `UnrecognizedPath`.
pub fn validate_ownership(owner: ImageOwner, relative_path: &str) -> Result<(), AppError> {
    let parsed = paths::parse(relative_path)?;
    let path_owner = parsed.owner();

    if path_owner != owner {
        return Err(AppError::OwnershipMismatch {
            expected: owner.to_string(),
            found: path_owner.to_string(),
        });
    }

    Ok(())
}

/// Compute the on-disk path a record's stored name refers to, without ever
/// trusting the column verbatim.
///
/// Normal rows store a base name; the path is derived from the declared
/// owner. Legacy or tampered rows may carry a full relative path in the
/// column; those are parsed through the grammar and their embedded owner
/// ids cross-checked against the declared owner — a record cannot be made
/// to resolve to another tenant's file by editing stored string content.
pub fn expected_path(
    owner: ImageOwner,
    stored_name: &str,
    kind: ImageKind,
) -> Result<String, AppError> {
    if !stored_name.contains('/') {
        return paths::resolve(owner, stored_name, kind);
    }

    // legacy free-form row: the column holds a relative path
    let parsed = paths::parse(stored_name)?;
    if parsed.owner() != owner {
        return Err(AppError::OwnershipMismatch {
            expected: owner.to_string(),
            found: parsed.owner().to_string(),
        });
    }
    if parsed.kind != kind {
        return Err(AppError::UnrecognizedPath(stored_name.to_string()));
    }

    Ok(stored_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::resolve;

    #[test]
    fn test_self_consistency_law() {
        // validate(owner, resolve(owner, ..)) always holds
        let owners = [
            ImageOwner::store(1),
            ImageOwner::store(77),
            ImageOwner::product(4, 11),
            ImageOwner::product(9, 3),
        ];
        for owner in owners {
            for kind in [ImageKind::Original, ImageKind::Thumbnail] {
                let path = resolve(owner, "img.jpg", kind).unwrap();
                assert!(validate_ownership(owner, &path).is_ok(), "path {}", path);
            }
        }
    }

    #[test]
    fn test_mismatch_for_every_differing_store_pair() {
        let ids = [1i64, 2, 4, 7, 42, 987654321];
        for &claimed in &ids {
            for &actual in &ids {
                let path = resolve(ImageOwner::store(actual), "img.jpg", ImageKind::Original)
                    .unwrap();
                let result = validate_ownership(ImageOwner::store(claimed), &path);
                if claimed == actual {
                    assert!(result.is_ok());
                } else {
                    assert!(
                        matches!(result, Err(AppError::OwnershipMismatch { .. })),
                        "claimed {} actual {}",
                        claimed,
                        actual
                    );
                }
            }
        }
    }

    #[test]
    fn test_mismatch_for_differing_product_ids() {
        let path = resolve(ImageOwner::product(4, 11), "img.jpg", ImageKind::Original).unwrap();

        // same store, different product
        assert!(matches!(
            validate_ownership(ImageOwner::product(4, 12), &path),
            Err(AppError::OwnershipMismatch { .. })
        ));
        // different store, same product
        assert!(matches!(
            validate_ownership(ImageOwner::product(7, 11), &path),
            Err(AppError::OwnershipMismatch { .. })
        ));
        // store owner claiming a product path
        assert!(matches!(
            validate_ownership(ImageOwner::store(4), &path),
            Err(AppError::OwnershipMismatch { .. })
        ));
    }

    #[test]
    fn test_unrecognized_path_is_not_coerced() {
        let result = validate_ownership(ImageOwner::store(4), "uploads/legacy.jpg");
        assert!(matches!(result, Err(AppError::UnrecognizedPath(_))));
    }

    #[test]
    fn test_expected_path_derives_from_basename() {
        let path = expected_path(ImageOwner::product(4, 11), "img.jpg", ImageKind::Original)
            .unwrap();
        assert_eq!(path, "stores/4/products/11/img.jpg");
    }

    #[test]
    fn test_expected_path_accepts_matching_legacy_path() {
        let path = expected_path(
            ImageOwner::product(4, 11),
            "stores/4/products/11/img.jpg",
            ImageKind::Original,
        )
        .unwrap();
        assert_eq!(path, "stores/4/products/11/img.jpg");
    }

    #[test]
    fn test_expected_path_rejects_foreign_legacy_path() {
        // a tampered column pointing into another store's tree
        let result = expected_path(
            ImageOwner::product(4, 11),
            "stores/7/img.jpg",
            ImageKind::Original,
        );
        assert!(matches!(result, Err(AppError::OwnershipMismatch { .. })));
    }

    #[test]
    fn test_expected_path_rejects_kind_confusion() {
        let result = expected_path(
            ImageOwner::store(4),
            "stores/4/thumbnails/img.jpg",
            ImageKind::Original,
        );
        assert!(matches!(result, Err(AppError::UnrecognizedPath(_))));
    }
}
