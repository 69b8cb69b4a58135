use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder, AwsCredential};
use object_store::path::Path as ObjPath;
use object_store::{CredentialProvider, ObjectStore, PutMode, PutOptions, PutPayload, UpdateVersion};
use std::sync::Arc;

use super::{FileInfo, S3Config, Storage, StorageError};

/// S3-compatible backend. Credentials are always resolved statically and
/// handed to `object_store` directly — never the default IMDS credential
/// chain, which hangs when not actually running on AWS infrastructure. ETag
/// is the provider's own, passed through verbatim via `PutMode::Update`.
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
}

impl S3Storage {
    pub fn new(cfg: &S3Config) -> Result<Self, StorageError> {
        let bucket = cfg
            .bucket
            .clone()
            .ok_or_else(|| StorageError::InvalidConfig("s3 backend requires a bucket".into()))?;
        let region = cfg.region.clone().unwrap_or_else(|| "us-east-1".to_string());

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&bucket)
            .with_region(&region)
            .with_virtual_hosted_style_request(!cfg.path_style);

        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.with_endpoint(endpoint.clone());
            if endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
        }

        if let (Some(access_key), Some(secret_key)) = (&cfg.access_key, &cfg.secret_key) {
            let credential = AwsCredential {
                key_id: access_key.clone(),
                secret_key: secret_key.clone(),
                token: None,
            };
            let provider: Arc<dyn CredentialProvider<Credential = AwsCredential>> =
                Arc::new(object_store::StaticCredentialProvider::new(credential));
            builder = builder.with_credentials(provider);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            store,
            bucket,
            region,
        })
    }

    fn precondition_err(expected: Option<&str>, err: object_store::Error) -> StorageError {
        match err {
            object_store::Error::Precondition { .. } | object_store::Error::AlreadyExists { .. } => {
                StorageError::PreconditionFailed {
                    expected: expected.map(|s| s.to_string()),
                }
            }
            other => StorageError::ObjectStore(other),
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn read(&self, path: &str) -> Result<(Bytes, FileInfo), StorageError> {
        let obj_path = ObjPath::from(path);
        let result = self.store.get(&obj_path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => StorageError::NotFound(path.to_string()),
            other => StorageError::ObjectStore(other),
        })?;
        let meta = result.meta.clone();
        let bytes = result.bytes().await?;
        let info = FileInfo {
            size: meta.size as u64,
            etag: meta.e_tag.unwrap_or_default(),
            mtime_ms: meta.last_modified.timestamp_millis(),
        };
        Ok((bytes, info))
    }

    async fn write(
        &self,
        path: &str,
        bytes: Bytes,
        if_match: Option<&str>,
    ) -> Result<FileInfo, StorageError> {
        let obj_path = ObjPath::from(path);
        let payload = PutPayload::from_bytes(bytes.clone());

        let mode = match if_match {
            None => PutMode::Overwrite,
            Some("") => PutMode::Create,
            Some(etag) => PutMode::Update(UpdateVersion {
                e_tag: Some(etag.to_string()),
                version: None,
            }),
        };

        let result = self
            .store
            .put_opts(&obj_path, payload, PutOptions::from(mode))
            .await
            .map_err(|e| Self::precondition_err(if_match, e))?;

        Ok(FileInfo {
            size: bytes.len() as u64,
            etag: result.e_tag.unwrap_or_default(),
            mtime_ms: crate::id::now_ms(),
        })
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, StorageError> {
        let obj_path = ObjPath::from(path);
        let meta = self.store.head(&obj_path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => StorageError::NotFound(path.to_string()),
            other => StorageError::ObjectStore(other),
        })?;
        Ok(FileInfo {
            size: meta.size as u64,
            etag: meta.e_tag.unwrap_or_default(),
            mtime_ms: meta.last_modified.timestamp_millis(),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let obj_path = ObjPath::from(path);
        match self.store.delete(&obj_path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir(&self, _path: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn to_engine_read_path(&self, path: &str) -> String {
        format!("s3://{}/{}", self.bucket, path)
    }

    fn to_engine_write_path(&self, path: &str) -> String {
        format!("s3://{}/{}", self.bucket, path)
    }

    fn to_engine_credential_config(&self, name: &str) -> String {
        format!("CREATE OR REPLACE SECRET {name} (TYPE S3, REGION '{}');", self.region)
    }

    fn root_url(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_bucket() {
        let cfg = S3Config::default();
        let err = S3Storage::new(&cfg).unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));
    }

    #[test]
    fn builds_with_bucket_and_defaults_region() {
        let cfg = S3Config {
            bucket: Some("my-bucket".to_string()),
            ..Default::default()
        };
        let storage = S3Storage::new(&cfg).unwrap();
        assert_eq!(storage.region, "us-east-1");
        assert_eq!(storage.root_url(), "s3://my-bucket");
    }
}
