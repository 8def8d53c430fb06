//! Startup secret retrieval from Google Secret Manager.
//!
//! The storage credential is materialized as a private temporary file that
//! lives as long as the returned [`Secrets`] value.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::config::{Config, GEMINI_KEY_SECRET, PROJECT_ID, STORAGE_CREDENTIAL_SECRET};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("failed to obtain access token: {0}")]
    Token(String),
    #[error("failed to access secret {name}: {reason}")]
    Access { name: String, reason: String },
    #[error("secret {0} is not valid UTF-8 text")]
    Encoding(String),
    #[error("failed to write credential file: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the storage credential lives on disk.
pub enum StorageCredential {
    /// Written by us; removed on drop.
    Temporary(NamedTempFile),
    /// Provided by the environment.
    Provided(PathBuf),
}

impl StorageCredential {
    pub fn path(&self) -> &Path {
        match self {
            Self::Temporary(file) => file.path(),
            Self::Provided(path) => path,
        }
    }
}

/// Secrets resolved at startup. Never refreshed.
pub struct Secrets {
    pub storage_credential: StorageCredential,
    pub gemini_api_key: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("storage_credential", &self.storage_credential.path())
            .field("gemini_api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

pub struct SecretProvider {
    client: Client,
    endpoint: String,
    metadata_host: String,
    credentials_override: Option<PathBuf>,
    gemini_key_override: Option<String>,
}

impl SecretProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.secret_manager_endpoint.clone(),
            metadata_host: config.metadata_host.clone(),
            credentials_override: config.credentials_override.clone(),
            gemini_key_override: config.gemini_key_override.clone(),
        }
    }

    /// Fetch the storage credential, then the Gemini key. No retries.
    pub async fn initialize(&self) -> Result<Secrets, SecretError> {
        let mut token = None;

        let storage_credential = match &self.credentials_override {
            Some(path) => {
                tracing::info!("Using storage credential from {}", path.display());
                StorageCredential::Provided(path.clone())
            }
            None => {
                let bearer = self.access_token().await?;
                let json = self.access_secret(&bearer, STORAGE_CREDENTIAL_SECRET).await?;
                token = Some(bearer);
                StorageCredential::Temporary(write_private_file(&json)?)
            }
        };

        let gemini_api_key = match &self.gemini_key_override {
            Some(key) => key.clone(),
            None => {
                let result = match token {
                    Some(bearer) => self.access_secret(&bearer, GEMINI_KEY_SECRET).await,
                    None => match self.access_token().await {
                        Ok(bearer) => self.access_secret(&bearer, GEMINI_KEY_SECRET).await,
                        Err(e) => Err(e),
                    },
                };
                match result {
                    Ok(key) => {
                        tracing::info!("Gemini AI API key successfully configured");
                        key.trim().to_string()
                    }
                    Err(e) => {
                        tracing::error!("Failed to retrieve Gemini API key: {}", e);
                        return Err(e);
                    }
                }
            }
        };

        Ok(Secrets {
            storage_credential,
            gemini_api_key,
        })
    }

    async fn access_token(&self) -> Result<String, SecretError> {
        let url = format!(
            "http://{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.metadata_host
        );
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| SecretError::Token(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SecretError::Token(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| SecretError::Token(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn access_secret(&self, bearer: &str, name: &str) -> Result<String, SecretError> {
        let url = format!(
            "{}/v1/projects/{}/secrets/{}/versions/latest:access",
            self.endpoint, PROJECT_ID, name
        );
        let access_err = |reason: String| SecretError::Access {
            name: name.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| access_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(access_err(format!("{}: {}", status, body)));
        }

        let version: AccessSecretVersionResponse = response
            .json()
            .await
            .map_err(|e| access_err(e.to_string()))?;
        let raw = general_purpose::STANDARD
            .decode(version.payload.data.as_bytes())
            .map_err(|e| access_err(e.to_string()))?;

        tracing::debug!("Fetched secret {}", name);
        String::from_utf8(raw).map_err(|_| SecretError::Encoding(name.to_string()))
    }
}

fn write_private_file(contents: &str) -> Result<NamedTempFile, SecretError> {
    // NamedTempFile is created with owner-only permissions.
    let mut file = tempfile::Builder::new()
        .prefix("gcs_service_account")
        .suffix(".json")
        .tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CREDENTIAL_PATH: &str =
        "/v1/projects/image-upload-gcp-project/secrets/GCS_SERVICE_ACCOUNT_KEY/versions/latest:access";
    const GEMINI_PATH: &str =
        "/v1/projects/image-upload-gcp-project/secrets/GEMINI_API_KEY/versions/latest:access";

    fn provider_for(server: &MockServer) -> SecretProvider {
        let config = Config {
            secret_manager_endpoint: server.uri(),
            metadata_host: server.address().to_string(),
            ..Config::default()
        };
        SecretProvider::new(&config)
    }

    fn secret_body(value: &str) -> serde_json::Value {
        serde_json::json!({
            "name": "projects/1/secrets/x/versions/1",
            "payload": { "data": general_purpose::STANDARD.encode(value) }
        })
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(
                "/computeMetadata/v1/instance/service-accounts/default/token",
            ))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn writes_credential_and_reads_key() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path(CREDENTIAL_PATH))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(secret_body("{\"type\":\"service_account\"}")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(GEMINI_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(secret_body("key-123\n")))
            .mount(&server)
            .await;

        let secrets = provider_for(&server).initialize().await.unwrap();
        assert_eq!(secrets.gemini_api_key, "key-123");
        let written = std::fs::read_to_string(secrets.storage_credential.path()).unwrap();
        assert_eq!(written, "{\"type\":\"service_account\"}");
    }

    #[tokio::test]
    async fn missing_credential_is_fatal() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path(CREDENTIAL_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = provider_for(&server).initialize().await.unwrap_err();
        assert!(matches!(err, SecretError::Access { ref name, .. } if name == STORAGE_CREDENTIAL_SECRET));
    }

    #[tokio::test]
    async fn missing_gemini_key_is_fatal() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path(CREDENTIAL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(secret_body("{}")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(GEMINI_PATH))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = provider_for(&server).initialize().await.unwrap_err();
        assert!(matches!(err, SecretError::Access { ref name, .. } if name == GEMINI_KEY_SECRET));
    }

    #[tokio::test]
    async fn environment_overrides_skip_secret_manager() {
        let config = Config {
            credentials_override: Some(PathBuf::from("/etc/creds.json")),
            gemini_key_override: Some("local-key".to_string()),
            metadata_host: "127.0.0.1:9".to_string(),
            ..Config::default()
        };
        let secrets = SecretProvider::new(&config).initialize().await.unwrap();
        assert_eq!(secrets.storage_credential.path(), Path::new("/etc/creds.json"));
        assert_eq!(secrets.gemini_api_key, "local-key");
    }
}
