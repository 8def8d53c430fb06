//! Object store gateway for a single bucket.
//!
//! Wraps an [`ObjectStore`] plus a [`Signer`] so that routes never see
//! backend errors directly. Every failure is logged here, with the bucket and
//! key, before being handed back as a flag, an empty list, or `None`.

use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{gcp::GoogleCloudStorageBuilder, path::Path, signer::Signer, ObjectStore};
use url::Url;

const IMAGE_EXTENSIONS: [&str; 2] = [".jpg", ".jpeg"];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(String),
    #[error("failed to read local file {path}: {source}")]
    LocalFile {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Backend(#[from] object_store::Error),
}

#[derive(Clone)]
pub struct ObjectStoreGateway {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    signer: Arc<dyn Signer>,
}

impl ObjectStoreGateway {
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>, signer: Arc<dyn Signer>) -> Self {
        Self {
            bucket: bucket.into(),
            store,
            signer,
        }
    }

    /// Connect to a GCS bucket using a service-account key file.
    pub fn gcs(bucket: &str, credentials: &FsPath) -> Result<Self, StorageError> {
        let gcs = Arc::new(
            GoogleCloudStorageBuilder::new()
                .with_bucket_name(bucket)
                .with_service_account_path(credentials.to_string_lossy())
                .build()?,
        );
        Ok(Self::new(bucket, gcs.clone(), gcs))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Copy a local file to `key`. Overwrites any existing object.
    pub async fn upload(&self, local_path: &FsPath, key: &str) -> Result<(), StorageError> {
        let result = self.put_file(local_path, key).await;
        match &result {
            Ok(()) => tracing::info!("Uploaded {} to bucket {}", key, self.bucket),
            Err(e) => tracing::error!(
                "Failed to upload {} to bucket {} as {}: {}",
                local_path.display(),
                self.bucket,
                key,
                e
            ),
        }
        result
    }

    async fn put_file(&self, local_path: &FsPath, key: &str) -> Result<(), StorageError> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|source| StorageError::LocalFile {
                path: local_path.display().to_string(),
                source,
            })?;
        self.store.put(&Path::from(key), data.into()).await?;
        Ok(())
    }

    /// Keys of every `.jpg`/`.jpeg` object. Empty on failure.
    pub async fn list(&self) -> Vec<String> {
        match self.store.list(None).try_collect::<Vec<_>>().await {
            Ok(objects) => objects
                .into_iter()
                .map(|meta| meta.location.to_string())
                .filter(|key| is_image_key(key))
                .collect(),
            Err(e) => {
                tracing::error!("Failed to list images in bucket {}: {}", self.bucket, e);
                Vec::new()
            }
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.store.head(&Path::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => {
                tracing::error!("Failed to check {} in bucket {}: {}", key, self.bucket, e);
                Err(e.into())
            }
        }
    }

    pub async fn fetch(&self, key: &str) -> Result<Bytes, StorageError> {
        let result = match self.store.get(&Path::from(key)).await {
            Ok(get) => get.bytes().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(bytes) => Ok(bytes),
            Err(object_store::Error::NotFound { .. }) => {
                tracing::warn!("Object {} not found in bucket {}", key, self.bucket);
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => {
                tracing::error!("Failed to download {} from bucket {}: {}", key, self.bucket, e);
                Err(e.into())
            }
        }
    }

    /// Time-limited GET URL for `key`, or `None` if the object is missing or
    /// signing fails.
    pub async fn signed_url(&self, key: &str, expires_in: Duration) -> Option<Url> {
        match self.exists(key).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::error!("File {} not found in bucket {}", key, self.bucket);
                return None;
            }
            Err(_) => return None,
        }

        match self
            .signer
            .signed_url(http::Method::GET, &Path::from(key), expires_in)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::error!("Failed to generate signed URL for {}: {}", key, e);
                None
            }
        }
    }
}

pub fn is_image_key(key: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|ext| key.ends_with(ext))
}

/// Key of the metadata object that accompanies `image_key`.
///
/// Replaces the final extension with `.json`; a name without one simply gains
/// the suffix.
pub fn metadata_key(image_key: &str) -> String {
    let name_start = image_key.rfind('/').map_or(0, |i| i + 1);
    let name = &image_key[name_start..];
    // A leading dot marks a hidden file, not an extension.
    let stem_len = match name.rfind('.') {
        Some(i) if name[..i].chars().any(|c| c != '.') => i,
        _ => name.len(),
    };
    format!("{}.json", &image_key[..name_start + stem_len])
}
