use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::{FileInfo, Storage, StorageError};

/// Local filesystem backend. ETag is the hex MD5 of the file's current
/// bytes, computed on read and verified (read-before-write) on conditional
/// write — the ETag contract spec.md §4.1 requires for backends that don't
/// mint their own version tokens.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn current_etag(bytes: &[u8]) -> String {
        format!("{:x}", md5::compute(bytes))
    }

    fn read_if_exists(full: &Path) -> Result<Option<(Vec<u8>, std::fs::Metadata)>, StorageError> {
        match std::fs::read(full) {
            Ok(bytes) => {
                let meta = std::fs::metadata(full)?;
                Ok(Some((bytes, meta)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn mtime_ms(meta: &std::fs::Metadata) -> i64 {
        meta.modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn read(&self, path: &str) -> Result<(Bytes, FileInfo), StorageError> {
        let full = self.resolve(path);
        let (bytes, meta) = Self::read_if_exists(&full)?
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        let info = FileInfo {
            size: bytes.len() as u64,
            etag: Self::current_etag(&bytes),
            mtime_ms: Self::mtime_ms(&meta),
        };
        Ok((Bytes::from(bytes), info))
    }

    async fn write(
        &self,
        path: &str,
        bytes: Bytes,
        if_match: Option<&str>,
    ) -> Result<FileInfo, StorageError> {
        let full = self.resolve(path);
        let existing = Self::read_if_exists(&full)?;

        if let Some(expected) = if_match {
            match &existing {
                Some((current_bytes, _)) => {
                    let current_etag = Self::current_etag(current_bytes);
                    if expected.is_empty() || expected != current_etag {
                        return Err(StorageError::PreconditionFailed {
                            expected: Some(expected.to_string()),
                        });
                    }
                }
                None => {
                    if !expected.is_empty() {
                        return Err(StorageError::PreconditionFailed {
                            expected: Some(expected.to_string()),
                        });
                    }
                }
            }
        }

        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, &bytes)?;
        let meta = std::fs::metadata(&full)?;
        Ok(FileInfo {
            size: bytes.len() as u64,
            etag: Self::current_etag(&bytes),
            mtime_ms: Self::mtime_ms(&meta),
        })
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, StorageError> {
        let full = self.resolve(path);
        let (bytes, meta) = Self::read_if_exists(&full)?
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        Ok(FileInfo {
            size: bytes.len() as u64,
            etag: Self::current_etag(&bytes),
            mtime_ms: Self::mtime_ms(&meta),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path);
        match std::fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir(&self, path: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn to_engine_read_path(&self, path: &str) -> String {
        self.resolve(path).to_string_lossy().into_owned()
    }

    fn to_engine_write_path(&self, path: &str) -> String {
        self.resolve(path).to_string_lossy().into_owned()
    }

    fn to_engine_credential_config(&self, _name: &str) -> String {
        String::new()
    }

    fn root_url(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_write_requires_empty_if_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path()).unwrap();

        let err = store
            .write("a.txt", Bytes::from_static(b"hi"), Some("deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PreconditionFailed { .. }));

        let info = store
            .write("a.txt", Bytes::from_static(b"hi"), Some(""))
            .await
            .unwrap();
        assert_eq!(info.size, 2);
    }

    #[tokio::test]
    async fn conditional_write_rejects_stale_etag() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path()).unwrap();
        let first = store
            .write("a.txt", Bytes::from_static(b"one"), None)
            .await
            .unwrap();

        let err = store
            .write("a.txt", Bytes::from_static(b"two"), Some("not-the-etag"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PreconditionFailed { .. }));

        let ok = store
            .write("a.txt", Bytes::from_static(b"two"), Some(&first.etag))
            .await
            .unwrap();
        assert_ne!(ok.etag, first.etag);
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path()).unwrap();
        let err = store.read("missing.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path()).unwrap();
        store.delete("never-existed.txt").await.unwrap();
    }
}
