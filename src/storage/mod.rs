//! Storage (C1): a uniform byte-blob surface over local filesystem and
//! S3-compatible object stores, with ETag-conditional writes.
//!
//! Grounded on `adapters/file_storage.rs`'s `FileStorageHandler` (the
//! `create_s3_store` credential-resolution shape, `ObjectStore`-backed I/O)
//! and `config/s3.rs`'s endpoint-configuration fields.

mod local;
mod s3;

pub use local::LocalStorage;
pub use s3::S3Storage;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Leaf error type for C1. Other layers wrap this with `#[from]`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("precondition failed: expected etag {expected:?}")]
    PreconditionFailed { expected: Option<String> },

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),
}

/// Metadata returned alongside every read/write/stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    pub etag: String,
    /// Milliseconds since Unix epoch.
    pub mtime_ms: i64,
}

/// Endpoint configuration for the S3-compatible backend (spec §4.1).
/// The absence of `bucket` selects the local filesystem backend instead.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub path_style: bool,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &str) -> Result<(Bytes, FileInfo), StorageError>;

    /// Conditional write. `if_match = None` means no precondition (always
    /// overwrite). `if_match = Some("")` means "no prior version observed" —
    /// it succeeds only when the object does not yet exist. `if_match =
    /// Some(etag)` requires the current object's etag to equal `etag`.
    async fn write(
        &self,
        path: &str,
        bytes: Bytes,
        if_match: Option<&str>,
    ) -> Result<FileInfo, StorageError>;

    async fn stat(&self, path: &str) -> Result<FileInfo, StorageError>;

    /// Idempotent: deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// No-op on object stores; ensures parent directories on local FS.
    async fn create_dir(&self, path: &str) -> Result<(), StorageError>;

    /// Translate a logical path into the engine's URL form for reads.
    fn to_engine_read_path(&self, path: &str) -> String;

    /// Translate a logical path into the engine's URL form for writes.
    fn to_engine_write_path(&self, path: &str) -> String;

    /// Opaque credential/session configuration the engine needs to reach
    /// this backend directly (e.g. for `COPY ... TO 's3://...'`). Empty
    /// string when the backend needs no such configuration (local FS).
    fn to_engine_credential_config(&self, name: &str) -> String;

    /// The root this backend addresses things under, e.g. `file:///data` or
    /// `s3://bucket/prefix`. Used to build Delta/listing scans over a
    /// directory rather than a single object.
    fn root_url(&self) -> String;
}

/// Build the appropriate backend from configuration. `bucket` present
/// selects S3; its absence selects local FS rooted at `local_root`.
pub fn build_storage(
    local_root: &std::path::Path,
    s3: &S3Config,
) -> Result<Box<dyn Storage>, StorageError> {
    if s3.bucket.is_some() {
        Ok(Box::new(S3Storage::new(s3)?))
    } else {
        Ok(Box::new(LocalStorage::new(local_root)?))
    }
}
