//! Storage abstraction trait
//!
//! All storage backends (S3, local filesystem) implement [`ObjectStorage`].
//! The gateway is stateless: every call is independently retriable by its
//! caller.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use fotoflow_core::models::CompletedPart;

/// The two logical namespaces the pipeline reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Private area for untransformed uploads.
    Originals,
    /// Public area for serving derivatives.
    Assets,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Originals => "originals",
            Namespace::Assets => "assets",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Delete failed: {0}")]
    Delete(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Multipart upload error: {0}")]
    Multipart(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object storage gateway.
///
/// Uploads are idempotent overwrites; batch deletes are best-effort and
/// missing keys are not errors. Presigned operations are only available on
/// backends with a signing authority (S3); others return
/// [`StorageError::Unsupported`].
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Issue a presigned PUT URL for a reserved key. The caller must have
    /// already bound `key` to exactly one media item before issuing this.
    async fn presigned_put(
        &self,
        ns: Namespace,
        key: &str,
        content_type: &str,
        content_length: u64,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Upload a local file under `key`, overwriting any existing object.
    async fn upload_file(
        &self,
        ns: Namespace,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Download an object to a local path, returning the byte count.
    /// An absent key fails with [`StorageError::NotFound`].
    async fn download_to_path(&self, ns: Namespace, key: &str, dest: &Path)
        -> StorageResult<u64>;

    /// Best-effort batch delete. Missing keys are skipped silently; callers
    /// must not assume atomicity across `keys`.
    async fn delete_keys(&self, ns: Namespace, keys: &[String]) -> StorageResult<()>;

    /// Whether an object exists under `key`.
    async fn exists(&self, ns: Namespace, key: &str) -> StorageResult<bool>;

    /// Initiate a multipart session for `key`, returning the upload id.
    async fn create_multipart(
        &self,
        ns: Namespace,
        key: &str,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Issue a presigned PUT URL for one part of a multipart session.
    async fn presigned_part_put(
        &self,
        ns: Namespace,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Complete a multipart session. `parts` must be strictly ascending by
    /// part number; out-of-order lists are rejected.
    async fn complete_multipart(
        &self,
        ns: Namespace,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()>;
}

/// Shared ascending-order check for multipart completion. Both backends call
/// this before touching the session so the storage contract is uniform.
pub(crate) fn validate_part_order(parts: &[CompletedPart]) -> StorageResult<()> {
    if parts.is_empty() {
        return Err(StorageError::Multipart(
            "completion requires at least one part".to_string(),
        ));
    }
    for pair in parts.windows(2) {
        if pair[1].part_number <= pair[0].part_number {
            return Err(StorageError::Multipart(format!(
                "part numbers must be strictly ascending: {} then {}",
                pair[0].part_number, pair[1].part_number
            )));
        }
    }
    Ok(())
}
