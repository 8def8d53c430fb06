//! Image captioning via Google Gemini.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;

const UPLOAD_MIME_TYPE: &str = "image/jpeg";
const HISTORY_PROMPT: &str = "Generate title and description for the image and return as JSON";
const FOLLOW_UP_PROMPT: &str = "Generate title and description in JSON format";

const MISSING_TITLE: &str = "No title present";
const MISSING_DESCRIPTION: &str = "No description present";

/// Title and description stored next to each image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub title: String,
    pub description: String,
}

impl MetadataRecord {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Outcome of a captioning attempt. Every variant yields a displayable record.
#[derive(Debug, Clone, PartialEq)]
pub enum Caption {
    /// Whatever JSON the model produced.
    Generated(Value),
    /// The image never reached the service.
    UploadFailed,
    /// The model answered with something that is not JSON.
    InvalidResponse,
    /// Any other failure.
    Failed,
}

impl Caption {
    pub fn into_metadata(self) -> MetadataRecord {
        match self {
            Self::Generated(value) => MetadataRecord::new(
                field_text(&value, "title").unwrap_or_else(|| MISSING_TITLE.to_string()),
                field_text(&value, "description")
                    .unwrap_or_else(|| MISSING_DESCRIPTION.to_string()),
            ),
            Self::UploadFailed => {
                MetadataRecord::new("Upload Error", "Failed to upload image to Gemini AI.")
            }
            Self::InvalidResponse => {
                MetadataRecord::new("Invalid Response", "Gemini AI returned an invalid response.")
            }
            Self::Failed => {
                MetadataRecord::new("Error", "An error occurred while processing the image.")
            }
        }
    }
}

/// Only string fields count; anything else falls back to a placeholder.
pub(crate) fn field_text(value: &Value, field: &str) -> Option<String> {
    value.get(field)?.as_str().map(str::to_owned)
}

#[async_trait]
pub trait Captioner: Send + Sync {
    /// Caption the image at `image_path`. Never fails; degrades to a sentinel.
    async fn caption(&self, image_path: &Path) -> Caption;
}

/// Remove markdown code fences around a model reply.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct UploadFileResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

pub struct GeminiCaptioner {
    client: Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiCaptioner {
    pub fn new(config: &Config, api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_base: config.gemini_api_base.clone(),
            model: config.gemini_model.clone(),
            api_key,
        }
    }

    /// Push the image through the Files API resumable protocol.
    async fn upload_file(&self, image_path: &Path) -> anyhow::Result<UploadedFile> {
        let data = tokio::fs::read(image_path).await?;
        let display_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.api_base))
            .query(&[("key", &self.api_key)])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", UPLOAD_MIME_TYPE)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;

        if !start.status().is_success() {
            anyhow::bail!("upload start returned {}", start.status());
        }
        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow::anyhow!("no upload URL in response"))?
            .to_string();

        let finish = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await?;

        if !finish.status().is_success() {
            anyhow::bail!("upload finalize returned {}", finish.status());
        }
        let uploaded: UploadFileResponse = finish.json().await?;
        Ok(uploaded.file)
    }

    async fn generate(&self, file: &UploadedFile) -> anyhow::Result<String> {
        let mime_type = file.mime_type.as_deref().unwrap_or(UPLOAD_MIME_TYPE);
        let payload = serde_json::json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        { "file_data": { "mime_type": mime_type, "file_uri": file.uri } },
                        { "text": HISTORY_PROMPT }
                    ]
                },
                {
                    "role": "user",
                    "parts": [{ "text": FOLLOW_UP_PROMPT }]
                }
            ]
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.api_base, self.model
            ))
            .query(&[("key", &self.api_key)])
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API Error {}: {}", status, body);
        }

        let result: GenerateContentResponse = response.json().await?;
        let text: String = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .ok_or_else(|| anyhow::anyhow!("No caption in response"))?;
        Ok(text)
    }
}

#[async_trait]
impl Captioner for GeminiCaptioner {
    async fn caption(&self, image_path: &Path) -> Caption {
        let file = match self.upload_file(image_path).await {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("Failed to upload image to Gemini: {:#}", e);
                return Caption::UploadFailed;
            }
        };

        let text = match self.generate(&file).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Error in generative AI: {:#}", e);
                return Caption::Failed;
            }
        };
        tracing::debug!("Gemini API response: {}", text);

        match serde_json::from_str(&strip_code_fences(&text)) {
            Ok(value) => Caption::Generated(value),
            Err(_) => {
                tracing::error!("Invalid JSON response from Gemini AI");
                Caption::InvalidResponse
            }
        }
    }
}
