use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Request-level failures. Clients only ever see the status and a short
/// plain-text message; details go to the log.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("No file selected")]
    EmptyFilename,
    #[error("File name clashes with its metadata object")]
    MetadataNameClash,
    #[error("No file specified")]
    MissingFilename,
    #[error("GCS_BUCKET_NAME is not set")]
    BucketNotConfigured,
    #[error("Metadata not found")]
    MetadataNotFound,
    #[error("Invalid metadata format")]
    InvalidMetadata,
    #[error("File upload failed")]
    UploadFailed,
    #[error("Error generating image URL")]
    SignedUrl,
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("Internal Server Error")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingFile
            | Self::EmptyFilename
            | Self::MetadataNameClash
            | Self::MissingFilename => StatusCode::BAD_REQUEST,
            Self::MetadataNotFound => StatusCode::NOT_FOUND,
            Self::Multipart(e) => e.status(),
            Self::BucketNotConfigured
            | Self::InvalidMetadata
            | Self::UploadFailed
            | Self::SignedUrl
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Internal(ref e) = self {
            tracing::error!("Unexpected error: {:#}", e);
        }
        (status, self.to_string()).into_response()
    }
}
