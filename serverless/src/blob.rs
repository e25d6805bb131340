//! Object storage collaborator: bucket + key addressed blobs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::ServerlessError;

/// Minimal object store used by the pipeline stages
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ServerlessError>;

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ServerlessError>;

    /// Local directory backing an object that is opened in place (a database)
    fn locate(&self, bucket: &str, key: &str) -> Result<PathBuf, ServerlessError>;
}

/// Reject anything that could leave the bucket directory
fn check_segment(kind: &str, segment: &str) -> Result<(), ServerlessError> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
        return Err(ServerlessError::BadRequest(format!("Invalid {kind}: '{segment}'")));
    }
    Ok(())
}

pub(crate) fn validate_bucket(bucket: &str) -> Result<(), ServerlessError> {
    if bucket.contains('/') {
        return Err(ServerlessError::BadRequest(format!("Invalid bucket_name: '{bucket}'")));
    }
    check_segment("bucket_name", bucket)
}

pub(crate) fn validate_key(key: &str) -> Result<(), ServerlessError> {
    if key.is_empty() || key.starts_with('/') {
        return Err(ServerlessError::BadRequest(format!("Invalid key: '{key}'")));
    }
    key.split('/').try_for_each(|segment| check_segment("key", segment))
}

/// Filesystem blob store: `<root>/<bucket>/<key>`
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ServerlessError> {
        let path = self.locate(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(bucket, key, bytes = bytes.len(), "Read object");
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ServerlessError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ServerlessError> {
        let path = self.locate(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = body.len();
        tokio::fs::write(&path, body).await?;
        debug!(bucket, key, bytes, "Wrote object");
        Ok(())
    }

    fn locate(&self, bucket: &str, key: &str) -> Result<PathBuf, ServerlessError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.join(bucket), |path, segment| path.join(segment)))
    }
}
