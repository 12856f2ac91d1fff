//! The image vault: physical storage under the canonical media root.
//!
//! Every write goes through a temp-then-atomic-rename protocol so no reader
//! ever observes a partially written file at a canonical location. The
//! rename is also the serialization point for writes: generated filenames
//! are unique per write, so no broader locking is needed.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Suffix for in-flight temporary files. The walk skips these, and the
/// canonical grammar never produces them.
const TMP_SUFFIX: &str = ".tmp";

/// Vault operation errors
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Move failed: {0}")]
    MoveFailed(String),

    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid vault path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

impl From<VaultError> for shopmedia_core::AppError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::NotFound(path) => shopmedia_core::AppError::NotFound(path),
            other => shopmedia_core::AppError::Storage(other.to_string()),
        }
    }
}

/// Local filesystem vault rooted at the canonical media directory.
#[derive(Clone)]
pub struct ImageVault {
    root: PathBuf,
}

impl ImageVault {
    /// Create a vault rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> VaultResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            VaultError::ConfigError(format!(
                "Failed to create media root {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(ImageVault { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a canonical relative path to an absolute one, rejecting
    /// traversal sequences that could escape the root.
    fn rel_to_abs(&self, rel_path: &str) -> VaultResult<PathBuf> {
        if rel_path.is_empty()
            || rel_path.starts_with('/')
            || rel_path.contains('\\')
            || rel_path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(VaultError::InvalidPath(rel_path.to_string()));
        }

        Ok(self.root.join(rel_path))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(path: &Path) -> VaultResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write `data` to `rel_path` through the atomic protocol: the bytes
    /// land in a `.tmp` sibling on the same volume, are synced, and are
    /// renamed into place.
    pub async fn persist(&self, rel_path: &str, data: &[u8]) -> VaultResult<()> {
        let path = self.rel_to_abs(rel_path)?;
        let tmp_path = path.with_file_name(format!(
            "{}{}",
            path.file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| VaultError::InvalidPath(rel_path.to_string()))?,
            TMP_SUFFIX
        ));
        let size = data.len();

        Self::ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&tmp_path).await.map_err(|e| {
            VaultError::WriteFailed(format!(
                "Failed to create temp file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        if let Err(e) = file.write_all(data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(VaultError::WriteFailed(format!(
                "Failed to write temp file {}: {}",
                tmp_path.display(),
                e
            )));
        }

        if let Err(e) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(VaultError::WriteFailed(format!(
                "Failed to sync temp file {}: {}",
                tmp_path.display(),
                e
            )));
        }
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(VaultError::WriteFailed(format!(
                "Failed to commit {} into place: {}",
                path.display(),
                e
            )));
        }

        tracing::info!(
            path = %path.display(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Vault persist successful"
        );

        Ok(())
    }

    /// Atomically move a committed file to another canonical location.
    /// Same-volume rename only; the media tree is one volume by deployment
    /// contract. This is the primitive the reconciler uses for cross-tenant
    /// repairs.
    pub async fn relocate(&self, from_rel: &str, to_rel: &str) -> VaultResult<()> {
        let from_path = self.rel_to_abs(from_rel)?;
        let to_path = self.rel_to_abs(to_rel)?;

        if !fs::try_exists(&from_path).await.unwrap_or(false) {
            return Err(VaultError::NotFound(from_rel.to_string()));
        }

        Self::ensure_parent_dir(&to_path).await?;

        fs::rename(&from_path, &to_path).await.map_err(|e| {
            VaultError::MoveFailed(format!(
                "Failed to move {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            ))
        })?;

        tracing::info!(
            from = %from_path.display(),
            to = %to_path.display(),
            "Vault relocate successful"
        );

        Ok(())
    }

    /// Copy a file into a backup area outside the root, mirroring its
    /// relative layout under `backup_root/{stamp}/`. Returns the backup
    /// location.
    pub async fn backup(
        &self,
        rel_path: &str,
        backup_root: &Path,
        stamp: &str,
    ) -> VaultResult<PathBuf> {
        let from_path = self.rel_to_abs(rel_path)?;

        if !fs::try_exists(&from_path).await.unwrap_or(false) {
            return Err(VaultError::NotFound(rel_path.to_string()));
        }

        let to_path = backup_root.join(stamp).join(rel_path);
        Self::ensure_parent_dir(&to_path).await?;

        fs::copy(&from_path, &to_path).await.map_err(|e| {
            VaultError::CopyFailed(format!(
                "Failed to back up {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            ))
        })?;

        tracing::info!(
            from = %from_path.display(),
            to = %to_path.display(),
            "Vault backup successful"
        );

        Ok(to_path)
    }

    /// Restore a file from a backup location into the canonical tree.
    pub async fn restore(&self, backup_path: &Path, rel_path: &str) -> VaultResult<()> {
        let to_path = self.rel_to_abs(rel_path)?;

        if !fs::try_exists(backup_path).await.unwrap_or(false) {
            return Err(VaultError::NotFound(backup_path.display().to_string()));
        }

        Self::ensure_parent_dir(&to_path).await?;

        fs::copy(backup_path, &to_path).await.map_err(|e| {
            VaultError::CopyFailed(format!(
                "Failed to restore {} to {}: {}",
                backup_path.display(),
                to_path.display(),
                e
            ))
        })?;

        tracing::info!(
            from = %backup_path.display(),
            to = %to_path.display(),
            "Vault restore successful"
        );

        Ok(())
    }

    /// Delete a file. Deleting an absent file is not an error.
    pub async fn remove(&self, rel_path: &str) -> VaultResult<()> {
        let path = self.rel_to_abs(rel_path)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            VaultError::DeleteFailed(format!("Failed to delete {}: {}", path.display(), e))
        })?;

        tracing::info!(path = %path.display(), "Vault delete successful");

        Ok(())
    }

    pub async fn exists(&self, rel_path: &str) -> VaultResult<bool> {
        let path = self.rel_to_abs(rel_path)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    pub async fn read(&self, rel_path: &str) -> VaultResult<Vec<u8>> {
        let path = self.rel_to_abs(rel_path)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(VaultError::NotFound(rel_path.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            VaultError::ReadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Ok(data)
    }

    /// Read a committed file as a stream of chunks, for serving large
    /// originals without loading them into memory.
    pub async fn read_stream(
        &self,
        rel_path: &str,
    ) -> VaultResult<Pin<Box<dyn Stream<Item = Result<Bytes, VaultError>> + Send>>> {
        let path = self.rel_to_abs(rel_path)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(VaultError::NotFound(rel_path.to_string()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            VaultError::ReadFailed(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let reader = tokio_util::io::ReaderStream::new(file);
        let stream = reader.map(|result| {
            result.map_err(|e| VaultError::ReadFailed(format!("Failed to read chunk: {}", e)))
        });

        Ok(Box::pin(stream))
    }

    /// Enumerate every committed file under the root as a sorted list of
    /// `/`-separated relative paths. In-flight `.tmp` files are skipped.
    pub async fn walk(&self) -> VaultResult<Vec<String>> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(VaultError::ReadFailed(format!(
                        "Failed to list {}: {}",
                        dir.display(),
                        e
                    )))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();

                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                if path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(TMP_SUFFIX))
                {
                    continue;
                }

                let rel = path.strip_prefix(&self.root).map_err(|_| {
                    VaultError::ReadFailed(format!(
                        "Entry {} escaped the media root",
                        path.display()
                    ))
                })?;
                let rel_str = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(rel_str);
            }
        }

        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_persist_and_read() {
        let dir = tempdir().unwrap();
        let vault = ImageVault::new(dir.path()).await.unwrap();

        let data = b"image bytes".to_vec();
        vault.persist("stores/4/a.jpg", &data).await.unwrap();

        assert!(vault.exists("stores/4/a.jpg").await.unwrap());
        assert_eq!(vault.read("stores/4/a.jpg").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_persist_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let vault = ImageVault::new(dir.path()).await.unwrap();

        vault.persist("stores/4/a.jpg", b"x").await.unwrap();

        let listed = vault.walk().await.unwrap();
        assert_eq!(listed, vec!["stores/4/a.jpg".to_string()]);
        assert!(!dir.path().join("stores/4/a.jpg.tmp").exists());
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = tempdir().unwrap();
        let vault = ImageVault::new(dir.path()).await.unwrap();

        for bad in [
            "../escape.jpg",
            "stores/../../etc/passwd",
            "/etc/passwd",
            "stores/4/./a.jpg",
            "stores//a.jpg",
            "stores\\4\\a.jpg",
            "",
        ] {
            let result = vault.read(bad).await;
            assert!(
                matches!(result, Err(VaultError::InvalidPath(_))),
                "expected InvalidPath for {:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_relocate_moves_atomically() {
        let dir = tempdir().unwrap();
        let vault = ImageVault::new(dir.path()).await.unwrap();

        vault.persist("stores/7/a.jpg", b"moved").await.unwrap();
        vault
            .relocate("stores/7/a.jpg", "stores/4/products/11/a.jpg")
            .await
            .unwrap();

        assert!(!vault.exists("stores/7/a.jpg").await.unwrap());
        assert_eq!(
            vault.read("stores/4/products/11/a.jpg").await.unwrap(),
            b"moved"
        );
    }

    #[tokio::test]
    async fn test_relocate_missing_source() {
        let dir = tempdir().unwrap();
        let vault = ImageVault::new(dir.path()).await.unwrap();

        let result = vault.relocate("stores/7/gone.jpg", "stores/4/gone.jpg").await;
        assert!(matches!(result, Err(VaultError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_backup_and_restore() {
        let dir = tempdir().unwrap();
        let backup_dir = tempdir().unwrap();
        let vault = ImageVault::new(dir.path()).await.unwrap();

        vault.persist("stores/9/thumbnails/x.jpg", b"thumb").await.unwrap();
        let backup_path = vault
            .backup("stores/9/thumbnails/x.jpg", backup_dir.path(), "20250101T000000")
            .await
            .unwrap();

        assert!(backup_path.ends_with("20250101T000000/stores/9/thumbnails/x.jpg"));
        assert!(backup_path.exists());

        vault.remove("stores/9/thumbnails/x.jpg").await.unwrap();
        assert!(!vault.exists("stores/9/thumbnails/x.jpg").await.unwrap());

        vault
            .restore(&backup_path, "stores/9/thumbnails/x.jpg")
            .await
            .unwrap();
        assert_eq!(
            vault.read("stores/9/thumbnails/x.jpg").await.unwrap(),
            b"thumb"
        );
    }

    #[tokio::test]
    async fn test_remove_nonexistent_is_ok() {
        let dir = tempdir().unwrap();
        let vault = ImageVault::new(dir.path()).await.unwrap();

        assert!(vault.remove("stores/4/none.jpg").await.is_ok());
    }

    #[tokio::test]
    async fn test_walk_enumerates_tree() {
        let dir = tempdir().unwrap();
        let vault = ImageVault::new(dir.path()).await.unwrap();

        vault.persist("stores/4/a.jpg", b"1").await.unwrap();
        vault.persist("stores/4/thumbnails/a.jpg", b"2").await.unwrap();
        vault
            .persist("stores/4/products/11/b.jpg", b"3")
            .await
            .unwrap();
        // a stray temp file must be skipped
        tokio::fs::write(dir.path().join("stores/4/c.jpg.tmp"), b"partial")
            .await
            .unwrap();

        let listed = vault.walk().await.unwrap();
        assert_eq!(
            listed,
            vec![
                "stores/4/a.jpg".to_string(),
                "stores/4/products/11/b.jpg".to_string(),
                "stores/4/thumbnails/a.jpg".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_stream() {
        let dir = tempdir().unwrap();
        let vault = ImageVault::new(dir.path()).await.unwrap();

        let data = b"stream me".to_vec();
        vault.persist("stores/4/s.jpg", &data).await.unwrap();

        let mut stream = vault.read_stream("stores/4/s.jpg").await.unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(out, data);
    }
}
