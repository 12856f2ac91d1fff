//! Integrity scanner — read-only classification of filesystem/database
//! drift.
//!
//! Matching strategy: a record is first checked against its expected
//! canonical path (full relative-path comparison). Only when the expected
//! path is missing does the scanner fall back to basename matching, and
//! only when that basename occurs exactly once in the managed tree —
//! generated names embed a millisecond timestamp plus a UUIDv4, so
//! ambiguity is only possible for legacy or manually placed files.

use shopmedia_core::{expected_path, paths, AppError, ImageKind, ImageRecord, ParsedPath};
use shopmedia_db::ImageStore;
use shopmedia_storage::ImageVault;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::report::{CrossTenantMismatch, DanglingRecord, IntegrityDiff, MissingThumbnail};

#[derive(Clone)]
pub struct IntegrityScanner {
    store: Arc<dyn ImageStore>,
    vault: ImageVault,
}

fn basename(stored_name: &str) -> &str {
    stored_name.rsplit('/').next().unwrap_or(stored_name)
}

impl IntegrityScanner {
    pub fn new(store: Arc<dyn ImageStore>, vault: ImageVault) -> Self {
        Self { store, vault }
    }

    /// Walk the media tree and enumerate all records, producing a classified
    /// diff. Read-only and safe to run concurrently with traffic; a file
    /// appearing between the walk and the enumeration may be misclassified
    /// for one pass, which is why the reconciler re-checks fresh state
    /// before every destructive action.
    #[tracing::instrument(skip(self))]
    pub async fn scan(&self) -> Result<IntegrityDiff, AppError> {
        let files = self.vault.walk().await?;
        let records = self.store.list_all().await?;

        let diff = classify(files, &records);

        tracing::info!(
            valid = diff.valid_system_images,
            foreign = diff.foreign_files.len(),
            orphans = diff.potential_orphans.len(),
            dangling = diff.dangling_records.len(),
            missing_thumbnails = diff.missing_thumbnails.len(),
            cross_tenant = diff.cross_tenant_mismatches.len(),
            "Integrity scan complete"
        );

        Ok(diff)
    }
}

/// Pure classification over a snapshot of the tree and the table.
pub fn classify(files: Vec<String>, records: &[ImageRecord]) -> IntegrityDiff {
    let mut diff = IntegrityDiff::default();

    // partition the tree into system-managed and foreign files
    let mut managed: Vec<(String, ParsedPath)> = Vec::new();
    for file in files {
        match paths::parse(&file) {
            Ok(parsed) => managed.push((file, parsed)),
            Err(_) => diff.foreign_files.push(file),
        }
    }

    let managed_paths: HashSet<&str> = managed.iter().map(|(p, _)| p.as_str()).collect();
    let mut by_basename: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, (path, _)) in managed.iter().enumerate() {
        by_basename.entry(basename(path)).or_default().push(idx);
    }

    // every basename any record references, for orphan detection
    let mut referenced: HashSet<&str> = HashSet::new();

    for record in records {
        let owner = record.owner();
        referenced.insert(basename(&record.filename));
        if let Some(ref thumb) = record.thumbnail_filename {
            referenced.insert(basename(thumb));
        }

        // original
        match expected_path(owner, &record.filename, ImageKind::Original) {
            Ok(path) => {
                if managed_paths.contains(path.as_str()) {
                    diff.valid_system_images += 1;
                } else {
                    // basename fallback, only when unambiguous
                    let matched = by_basename
                        .get(basename(&record.filename))
                        .filter(|hits| hits.len() == 1)
                        .map(|hits| &managed[hits[0]]);
                    match matched {
                        Some((actual, parsed)) if parsed.owner() != owner => {
                            diff.cross_tenant_mismatches.push(CrossTenantMismatch {
                                image_id: record.id,
                                declared_owner: owner,
                                kind: ImageKind::Original,
                                actual_path: actual.clone(),
                                target_path: path,
                            });
                        }
                        _ => diff.dangling_records.push(DanglingRecord {
                            image_id: record.id,
                            expected_path: path,
                        }),
                    }
                }
            }
            Err(AppError::OwnershipMismatch { .. }) => {
                // the stored column itself points into another tenant's tree
                let target = paths::resolve(owner, basename(&record.filename), ImageKind::Original)
                    .unwrap_or_else(|_| record.filename.clone());
                diff.cross_tenant_mismatches.push(CrossTenantMismatch {
                    image_id: record.id,
                    declared_owner: owner,
                    kind: ImageKind::Original,
                    actual_path: record.filename.clone(),
                    target_path: target,
                });
            }
            Err(_) => {
                // unresolvable column: the record cannot reference any
                // managed file
                diff.dangling_records.push(DanglingRecord {
                    image_id: record.id,
                    expected_path: record.filename.clone(),
                });
            }
        }

        // thumbnail
        match record.thumbnail_filename {
            Some(ref thumb) => match expected_path(owner, thumb, ImageKind::Thumbnail) {
                Ok(path) => {
                    if managed_paths.contains(path.as_str()) {
                        diff.valid_system_images += 1;
                    } else {
                        diff.missing_thumbnails.push(MissingThumbnail {
                            image_id: record.id,
                            expected_path: path,
                        });
                    }
                }
                Err(AppError::OwnershipMismatch { .. }) => {
                    let target = paths::resolve(owner, basename(thumb), ImageKind::Thumbnail)
                        .unwrap_or_else(|_| thumb.clone());
                    diff.cross_tenant_mismatches.push(CrossTenantMismatch {
                        image_id: record.id,
                        declared_owner: owner,
                        kind: ImageKind::Thumbnail,
                        actual_path: thumb.clone(),
                        target_path: target,
                    });
                }
                Err(_) => diff.missing_thumbnails.push(MissingThumbnail {
                    image_id: record.id,
                    expected_path: thumb.clone(),
                }),
            },
            None => {
                // partial-write artifact: the record survived a failed
                // thumbnail derivation
                if let Ok(path) =
                    paths::resolve(owner, basename(&record.filename), ImageKind::Thumbnail)
                {
                    diff.missing_thumbnails.push(MissingThumbnail {
                        image_id: record.id,
                        expected_path: path,
                    });
                }
            }
        }
    }

    // a managed file whose basename no record references is an orphan
    for (path, _) in &managed {
        if !referenced.contains(basename(path)) {
            diff.potential_orphans.push(path.clone());
        }
    }

    diff
}
