//! Storage backend factory.

use std::path::PathBuf;
use std::sync::Arc;

use crate::traits::{ObjectStorage, StorageError, StorageResult};

/// Backend selection, typically resolved from deployment configuration.
#[derive(Clone, Debug)]
pub enum StorageSettings {
    #[cfg(feature = "storage-s3")]
    S3 {
        originals_bucket: String,
        assets_bucket: String,
        region: Option<String>,
        endpoint_url: Option<String>,
        force_path_style: bool,
    },
    #[cfg(feature = "storage-local")]
    Local { base_path: PathBuf },
}

/// Build the configured storage backend.
pub async fn create_storage(settings: StorageSettings) -> StorageResult<Arc<dyn ObjectStorage>> {
    match settings {
        #[cfg(feature = "storage-s3")]
        StorageSettings::S3 {
            originals_bucket,
            assets_bucket,
            region,
            endpoint_url,
            force_path_style,
        } => {
            let storage = crate::s3::S3Storage::new(crate::s3::S3Settings {
                originals_bucket,
                assets_bucket,
                region,
                endpoint_url,
                force_path_style,
            })
            .await?;
            Ok(Arc::new(storage))
        }
        #[cfg(feature = "storage-local")]
        StorageSettings::Local { base_path } => {
            let storage = crate::local::LocalStorage::new(base_path).await?;
            Ok(Arc::new(storage))
        }
        #[allow(unreachable_patterns)]
        _ => Err(StorageError::Backend(
            "no storage backend enabled for these settings".to_string(),
        )),
    }
}
