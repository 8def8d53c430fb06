use std::path::PathBuf;
use std::time::Duration;

/// Project holding both secrets.
pub const PROJECT_ID: &str = "image-upload-gcp-project";
/// Secret containing the storage service-account JSON.
pub const STORAGE_CREDENTIAL_SECRET: &str = "GCS_SERVICE_ACCOUNT_KEY";
/// Secret containing the Gemini API key.
pub const GEMINI_KEY_SECRET: &str = "GEMINI_API_KEY";

const DEFAULT_BG_COLOR: &str = "#f0f2f5";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SIGNED_URL_SECS: u64 = 3600;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bucket_name: Option<String>,
    pub bg_color: String,
    pub host: String,
    pub port: u16,
    pub signed_url_ttl: Duration,
    pub max_upload_bytes: usize,
    /// Parent of the per-request scratch directories.
    pub scratch_dir: PathBuf,
    pub gemini_model: String,
    pub gemini_api_base: String,
    pub secret_manager_endpoint: String,
    pub metadata_host: String,
    /// Pre-provisioned service-account file, bypasses Secret Manager when set.
    pub credentials_override: Option<PathBuf>,
    /// Pre-provisioned Gemini key, bypasses Secret Manager when set.
    pub gemini_key_override: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_name: None,
            bg_color: DEFAULT_BG_COLOR.to_string(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            signed_url_ttl: Duration::from_secs(DEFAULT_SIGNED_URL_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            scratch_dir: std::env::temp_dir(),
            gemini_model: "gemini-1.5-flash".to_string(),
            gemini_api_base: "https://generativelanguage.googleapis.com".to_string(),
            secret_manager_endpoint: "https://secretmanager.googleapis.com".to_string(),
            metadata_host: "metadata.google.internal".to_string(),
            credentials_override: None,
            gemini_key_override: None,
        }
    }
}

impl Config {
    /// Load from the process environment, after applying any `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            bucket_name: get("GCS_BUCKET_NAME"),
            bg_color: get("BACKGROUND_COLOR").unwrap_or(defaults.bg_color),
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", get("PORT"), defaults.port)?,
            signed_url_ttl: Duration::from_secs(parse_or(
                "SIGNED_URL_EXPIRATION_SECS",
                get("SIGNED_URL_EXPIRATION_SECS"),
                DEFAULT_SIGNED_URL_SECS,
            )?),
            max_upload_bytes: parse_or(
                "MAX_UPLOAD_BYTES",
                get("MAX_UPLOAD_BYTES"),
                defaults.max_upload_bytes,
            )?,
            scratch_dir: get("UPLOAD_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_api_base: get("GEMINI_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_api_base),
            secret_manager_endpoint: get("SECRET_MANAGER_ENDPOINT")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.secret_manager_endpoint),
            metadata_host: get("GCE_METADATA_HOST").unwrap_or(defaults.metadata_host),
            credentials_override: get("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            gemini_key_override: get("GEMINI_API_KEY"),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
