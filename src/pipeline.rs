//! Upload and view orchestration.
//!
//! Upload: receive, caption, persist image and metadata, then clean up the
//! per-request scratch directory on every exit path. View: load metadata,
//! sign an image URL.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use url::Url;

use crate::captioner::{field_text, Captioner};
use crate::error::AppError;
use crate::storage::{metadata_key, ObjectStoreGateway, StorageError};

const NO_TITLE: &str = "No title available";
const NO_DESCRIPTION: &str = "No description available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Receiving,
    Captioning,
    Persisting,
    Cleanup,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Receiving => "receiving",
            Self::Captioning => "captioning",
            Self::Persisting => "persisting",
            Self::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// A file part pulled from the upload form.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data: Bytes,
}

/// Storage key for an uploaded filename: its final path component.
pub fn storage_key(filename: &str) -> Option<String> {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

pub struct UploadPipeline<'a> {
    storage: &'a ObjectStoreGateway,
    captioner: &'a dyn Captioner,
    scratch_root: &'a Path,
}

impl<'a> UploadPipeline<'a> {
    pub fn new(
        storage: &'a ObjectStoreGateway,
        captioner: &'a dyn Captioner,
        scratch_root: &'a Path,
    ) -> Self {
        Self {
            storage,
            captioner,
            scratch_root,
        }
    }

    /// Returns the storage key the image was saved under.
    pub async fn run(&self, image: UploadedImage) -> Result<String, AppError> {
        let key = storage_key(&image.filename).ok_or(AppError::EmptyFilename)?;
        // A `.json` upload would share its key with its own metadata object.
        if metadata_key(&key) == key {
            return Err(AppError::MetadataNameClash);
        }
        let workspace = tempfile::Builder::new()
            .prefix("upload-")
            .tempdir_in(self.scratch_root)?;

        let result = self.process(workspace.path(), &key, &image.data).await;

        tracing::debug!(stage = %UploadStage::Cleanup, key = %key, "Removing scratch files");
        if let Err(e) = workspace.close() {
            tracing::warn!("Failed to remove scratch files for {}: {}", key, e);
        }

        match result {
            Ok(()) => {
                tracing::info!("Upload of {} complete", key);
                Ok(key)
            }
            Err((stage, e)) => {
                tracing::error!(stage = %stage, "Upload of {} failed: {}", key, e);
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        workspace: &Path,
        key: &str,
        data: &[u8],
    ) -> Result<(), (UploadStage, AppError)> {
        let mut stage = UploadStage::Receiving;

        tracing::debug!(stage = %stage, key = %key, bytes = data.len());
        let image_path = workspace.join(key);
        tokio::fs::write(&image_path, data)
            .await
            .map_err(|e| (stage, AppError::from(e)))?;

        stage = UploadStage::Captioning;
        tracing::debug!(stage = %stage, key = %key);
        let record = self.captioner.caption(&image_path).await.into_metadata();

        stage = UploadStage::Persisting;
        tracing::debug!(stage = %stage, key = %key, title = %record.title);
        let json_key = metadata_key(key);
        let json_path = workspace.join(&json_key);
        let json = serde_json::to_vec(&record).map_err(|e| (stage, AppError::Internal(e.into())))?;
        tokio::fs::write(&json_path, json)
            .await
            .map_err(|e| (stage, AppError::from(e)))?;

        self.storage
            .upload(&image_path, key)
            .await
            .map_err(|_| (stage, AppError::UploadFailed))?;
        self.storage
            .upload(&json_path, &json_key)
            .await
            .map_err(|_| (stage, AppError::UploadFailed))?;

        Ok(())
    }
}

/// Everything the view page shows.
#[derive(Debug, Clone)]
pub struct ViewPage {
    pub image_url: Url,
    pub title: String,
    pub description: String,
}

pub async fn load_view(
    storage: &ObjectStoreGateway,
    filename: &str,
    url_ttl: Duration,
) -> Result<ViewPage, AppError> {
    let json_key = metadata_key(filename);

    let present = storage
        .exists(&json_key)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    if !present {
        tracing::error!("Metadata file {} not found in bucket {}", json_key, storage.bucket());
        return Err(AppError::MetadataNotFound);
    }

    let raw = match storage.fetch(&json_key).await {
        Ok(raw) => raw,
        Err(StorageError::NotFound(_)) => return Err(AppError::MetadataNotFound),
        Err(e) => return Err(AppError::Internal(e.into())),
    };
    let metadata: Value = serde_json::from_slice(&raw).map_err(|_| {
        tracing::error!("Invalid JSON in metadata file: {}", json_key);
        AppError::InvalidMetadata
    })?;

    let title = field_text(&metadata, "title").unwrap_or_else(|| NO_TITLE.to_string());
    let description =
        field_text(&metadata, "description").unwrap_or_else(|| NO_DESCRIPTION.to_string());

    let image_url = storage
        .signed_url(filename, url_ttl)
        .await
        .ok_or(AppError::SignedUrl)?;
    tracing::debug!("Generated signed URL: {}", image_url);

    Ok(ViewPage {
        image_url,
        title,
        description,
    })
}
