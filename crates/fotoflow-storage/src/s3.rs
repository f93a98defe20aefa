use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, Delete, ObjectIdentifier};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::traits::{validate_part_order, Namespace, ObjectStorage, StorageError, StorageResult};
use fotoflow_core::models::CompletedPart;

/// S3 deletes at most 1000 keys per DeleteObjects call.
const DELETE_BATCH_MAX: usize = 1000;

/// Settings for the S3 backend. `endpoint_url` enables S3-compatible
/// providers (MinIO, Spaces); path-style addressing is usually required
/// with a custom endpoint.
#[derive(Clone, Debug)]
pub struct S3Settings {
    pub originals_bucket: String,
    pub assets_bucket: String,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

/// S3 storage implementation over two buckets, one per namespace.
#[derive(Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    originals_bucket: String,
    assets_bucket: String,
}

impl S3Storage {
    pub async fn new(settings: S3Settings) -> StorageResult<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = settings.region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(ref endpoint) = settings.endpoint_url {
            builder = builder
                .endpoint_url(endpoint.clone())
                .force_path_style(settings.force_path_style);
        }

        Ok(S3Storage {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            originals_bucket: settings.originals_bucket,
            assets_bucket: settings.assets_bucket,
        })
    }

    fn bucket(&self, ns: Namespace) -> &str {
        match ns {
            Namespace::Originals => &self.originals_bucket,
            Namespace::Assets => &self.assets_bucket,
        }
    }

    fn presign_config(expires_in: Duration) -> StorageResult<PresigningConfig> {
        PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Backend(format!("invalid presign expiry: {e}")))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn presigned_put(
        &self,
        ns: Namespace,
        key: &str,
        content_type: &str,
        content_length: u64,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presigned = self
            .client
            .put_object()
            .bucket(self.bucket(ns))
            .key(key)
            .content_type(content_type)
            .content_length(content_length as i64)
            .presigned(Self::presign_config(expires_in)?)
            .await
            .map_err(|e| StorageError::Backend(format!("presign PUT failed: {e}")))?;

        tracing::debug!(
            namespace = %ns,
            key = %key,
            expires_secs = expires_in.as_secs(),
            "Issued presigned PUT"
        );

        Ok(presigned.uri().to_string())
    }

    async fn upload_file(
        &self,
        ns: Namespace,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Upload(format!("failed to read {:?}: {e}", local_path)))?;

        self.client
            .put_object()
            .bucket(self.bucket(ns))
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    namespace = %ns,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                StorageError::Upload(e.to_string())
            })?;

        tracing::info!(
            namespace = %ns,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(())
    }

    async fn download_to_path(
        &self,
        ns: Namespace,
        key: &str,
        dest: &Path,
    ) -> StorageResult<u64> {
        let start = std::time::Instant::now();

        let resp = self
            .client
            .get_object()
            .bucket(self.bucket(ns))
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                {
                    StorageError::NotFound(key.to_string())
                } else {
                    tracing::error!(
                        error = %e,
                        namespace = %ns,
                        key = %key,
                        "S3 download failed"
                    );
                    StorageError::Download(e.to_string())
                }
            })?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = resp.body;
        let mut written: u64 = 0;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::info!(
            namespace = %ns,
            key = %key,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(written)
    }

    async fn delete_keys(&self, ns: Namespace, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let start = std::time::Instant::now();

        for batch in keys.chunks(DELETE_BATCH_MAX) {
            let mut objects = Vec::with_capacity(batch.len());
            for key in batch {
                objects.push(
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| StorageError::Delete(e.to_string()))?,
                );
            }
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| StorageError::Delete(e.to_string()))?;

            self.client
                .delete_objects()
                .bucket(self.bucket(ns))
                .delete(delete)
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(
                        error = %e,
                        namespace = %ns,
                        batch_len = batch.len(),
                        "S3 batch delete failed"
                    );
                    StorageError::Delete(e.to_string())
                })?;
        }

        tracing::info!(
            namespace = %ns,
            key_count = keys.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 batch delete successful"
        );

        Ok(())
    }

    async fn exists(&self, ns: Namespace, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(self.bucket(ns))
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(StorageError::Backend(e.to_string()))
                }
            }
        }
    }

    async fn create_multipart(
        &self,
        ns: Namespace,
        key: &str,
        content_type: &str,
    ) -> StorageResult<String> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(self.bucket(ns))
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Multipart(e.to_string()))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                StorageError::Multipart("CreateMultipartUpload returned no upload id".to_string())
            })?
            .to_string();

        tracing::info!(namespace = %ns, key = %key, upload_id = %upload_id, "Multipart session created");

        Ok(upload_id)
    }

    async fn presigned_part_put(
        &self,
        ns: Namespace,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presigned = self
            .client
            .upload_part()
            .bucket(self.bucket(ns))
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .presigned(Self::presign_config(expires_in)?)
            .await
            .map_err(|e| StorageError::Multipart(format!("presign part failed: {e}")))?;

        Ok(presigned.uri().to_string())
    }

    async fn complete_multipart(
        &self,
        ns: Namespace,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        validate_part_order(parts)?;

        let completed_parts: Vec<aws_sdk_s3::types::CompletedPart> = parts
            .iter()
            .map(|p| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.etag.clone())
                    .build()
            })
            .collect();

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(self.bucket(ns))
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    namespace = %ns,
                    key = %key,
                    upload_id = %upload_id,
                    "Multipart completion failed"
                );
                StorageError::Multipart(e.to_string())
            })?;

        tracing::info!(
            namespace = %ns,
            key = %key,
            upload_id = %upload_id,
            part_count = parts.len(),
            "Multipart upload completed"
        );

        Ok(())
    }
}
