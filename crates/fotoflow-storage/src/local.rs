use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::traits::{validate_part_order, Namespace, ObjectStorage, StorageError, StorageResult};
use fotoflow_core::models::CompletedPart;

/// Local filesystem storage for development and tests.
///
/// Each namespace gets its own subdirectory under the base path. Presigned
/// operations need a signing authority and are unsupported here; multipart
/// sessions are staged in a hidden directory and concatenated on completion,
/// with the same strictly-ascending part-order contract as S3.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        for ns in [Namespace::Originals, Namespace::Assets] {
            fs::create_dir_all(base_path.join(ns.as_str())).await?;
        }
        Ok(LocalStorage { base_path })
    }

    /// Convert a storage key to a filesystem path, rejecting keys that could
    /// escape the namespace root.
    fn key_to_path(&self, ns: Namespace, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|seg| seg == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(ns.as_str()).join(key))
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(".multipart").join(upload_id)
    }

    /// Write one part's bytes into a staged multipart session. Stands in for
    /// the per-part presigned PUT this backend cannot issue.
    pub async fn stage_part(
        &self,
        upload_id: &str,
        part_number: i32,
        data: &[u8],
    ) -> StorageResult<String> {
        let dir = self.staging_dir(upload_id);
        if !fs::try_exists(&dir).await? {
            return Err(StorageError::Multipart(format!(
                "unknown upload id: {upload_id}"
            )));
        }
        fs::write(dir.join(format!("part-{part_number:05}")), data).await?;
        // Mimic the ETag a real backend would return for the part.
        Ok(format!("local-{part_number}-{}", data.len()))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn presigned_put(
        &self,
        _ns: Namespace,
        _key: &str,
        _content_type: &str,
        _content_length: u64,
        _expires_in: Duration,
    ) -> StorageResult<String> {
        Err(StorageError::Unsupported(
            "presigned PUT requires the S3 backend",
        ))
    }

    async fn upload_file(
        &self,
        ns: Namespace,
        key: &str,
        local_path: &Path,
        _content_type: &str,
    ) -> StorageResult<()> {
        let dest = self.key_to_path(ns, key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(local_path, &dest).await?;
        tracing::debug!(namespace = %ns, key = %key, "Local upload successful");
        Ok(())
    }

    async fn download_to_path(
        &self,
        ns: Namespace,
        key: &str,
        dest: &Path,
    ) -> StorageResult<u64> {
        let src = self.key_to_path(ns, key)?;
        match fs::copy(&src, dest).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn delete_keys(&self, ns: Namespace, keys: &[String]) -> StorageResult<()> {
        for key in keys {
            let path = self.key_to_path(ns, key)?;
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
        Ok(())
    }

    async fn exists(&self, ns: Namespace, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(ns, key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn create_multipart(
        &self,
        ns: Namespace,
        key: &str,
        _content_type: &str,
    ) -> StorageResult<String> {
        // Validate the target key up front so completion cannot escape the root.
        self.key_to_path(ns, key)?;
        let upload_id = uuid::Uuid::new_v4().to_string();
        fs::create_dir_all(self.staging_dir(&upload_id)).await?;
        Ok(upload_id)
    }

    async fn presigned_part_put(
        &self,
        _ns: Namespace,
        _key: &str,
        _upload_id: &str,
        _part_number: i32,
        _expires_in: Duration,
    ) -> StorageResult<String> {
        Err(StorageError::Unsupported(
            "presigned part PUT requires the S3 backend",
        ))
    }

    async fn complete_multipart(
        &self,
        ns: Namespace,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        validate_part_order(parts)?;

        let dir = self.staging_dir(upload_id);
        let dest = self.key_to_path(ns, key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut assembled = Vec::new();
        for part in parts {
            let part_path = dir.join(format!("part-{:05}", part.part_number));
            let data = fs::read(&part_path).await.map_err(|_| {
                StorageError::Multipart(format!(
                    "missing part {} for upload {upload_id}",
                    part.part_number
                ))
            })?;
            assembled.extend_from_slice(&data);
        }

        fs::write(&dest, assembled).await?;
        fs::remove_dir_all(&dir).await.ok();

        tracing::debug!(namespace = %ns, key = %key, upload_id = %upload_id, "Local multipart completed");
        Ok(())
    }
}
