//! Uploaded file persistence. Files land under `<public_root>/uploads/<dir>/`
//! and are addressed by the public URL `/uploads/<dir>/<name>`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage write timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid storage path: {0}")]
    InvalidPath(String),
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Writes `bytes` as `dir/name` and returns its public URL.
    async fn store(&self, dir: &str, name: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// Best-effort removal of a previously stored file.
    async fn remove(&self, url: &str);
}

pub fn public_url(dir: &str, name: &str) -> String {
    format!("/uploads/{dir}/{name}")
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}

pub struct LocalFileStorage {
    uploads_root: PathBuf,
    timeout: Duration,
}

impl LocalFileStorage {
    pub fn new(public_root: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            uploads_root: public_root.as_ref().join("uploads"),
            timeout,
        }
    }

    fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix("/uploads/")?;
        let mut path = self.uploads_root.clone();
        for segment in relative.split('/') {
            if !is_plain_segment(segment) {
                return None;
            }
            path.push(segment);
        }
        Some(path)
    }

    async fn write(&self, dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir).await?;

        let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        if let Err(e) = async {
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await
        {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        drop(file);

        tokio::fs::rename(&tmp, target).await
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn store(&self, dir: &str, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if !is_plain_segment(dir) || !is_plain_segment(name) {
            return Err(StorageError::InvalidPath(format!("{dir}/{name}")));
        }

        let dir_path = self.uploads_root.join(dir);
        let target = dir_path.join(name);

        tokio::time::timeout(self.timeout, self.write(&dir_path, &target, bytes))
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))??;

        debug!("Stored {} bytes at {}", bytes.len(), target.display());
        Ok(public_url(dir, name))
    }

    async fn remove(&self, url: &str) {
        let Some(path) = self.path_for_url(url) else {
            warn!("Refusing to remove unrecognised upload URL {url}");
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove upload {}: {e}", path.display());
        }
    }
}

/// In-process storage that records what was written. Used by tests to
/// observe (or fail) writes without touching the disk.
#[derive(Default)]
pub struct MemoryFileStorage {
    files: Mutex<Vec<(String, Vec<u8>)>>,
    fail_writes: bool,
}

impl MemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FileStorage for MemoryFileStorage {
    async fn store(&self, dir: &str, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io(std::io::Error::other("write refused")));
        }
        let url = public_url(dir, name);
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((url.clone(), bytes.to_vec()));
        Ok(url)
    }

    async fn remove(&self, url: &str) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(stored, _)| stored != url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_storage_writes_under_uploads_and_removes() {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(root.path(), Duration::from_secs(5));

        let url = storage
            .store("tasks", "abc-report.pdf", b"%PDF-1.4")
            .await
            .unwrap();
        assert_eq!(url, "/uploads/tasks/abc-report.pdf");

        let on_disk = root.path().join("uploads/tasks/abc-report.pdf");
        assert_eq!(tokio::fs::read(&on_disk).await.unwrap(), b"%PDF-1.4");

        storage.remove(&url).await;
        assert!(!on_disk.exists());
    }

    #[tokio::test]
    async fn local_storage_rejects_traversal() {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(root.path(), Duration::from_secs(5));

        let err = storage.store("tasks", "../escape", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
        assert!(storage.path_for_url("/uploads/../secret").is_none());
        assert!(storage.path_for_url("/elsewhere/file").is_none());
    }

    #[tokio::test]
    async fn memory_storage_records_and_forgets() {
        let storage = MemoryFileStorage::new();
        let url = storage.store("avatars", "a.png", b"png").await.unwrap();
        assert_eq!(storage.urls(), vec![url.clone()]);

        storage.remove(&url).await;
        assert!(storage.is_empty());

        let failing = MemoryFileStorage::failing();
        assert!(failing.store("tasks", "x.pdf", b"x").await.is_err());
        assert!(failing.is_empty());
    }
}
