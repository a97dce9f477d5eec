//! Configuration types for imagefeed-dl

use crate::error::{Error, Result};
use crate::reconciler::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Local storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Base directory; each profile gets its own subdirectory here (default: ".")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Write post captions next to the image (default: true)
    #[serde(default = "default_true")]
    pub save_captions: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            save_captions: true,
        }
    }
}

/// Cleanup of non-media artifacts after a fetch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Run the reconciler after fetching (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filename suffixes treated as disposable (.txt, .zip, .json.xz)
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention: RetentionPolicy::default(),
        }
    }
}

/// Remote service settings for [`HttpContentSource`](crate::source::HttpContentSource)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the service (default: "https://www.instagram.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Posts requested per feed page (default: 12)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Minimum spacing between consecutive requests (default: 1 second)
    #[serde(default = "default_request_interval", with = "duration_serde")]
    pub request_interval: Duration,

    /// Identifier of the timeline feed query
    #[serde(default = "default_query_hash")]
    pub query_hash: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            page_size: default_page_size(),
            request_interval: default_request_interval(),
            query_hash: default_query_hash(),
        }
    }
}

/// Retry configuration for transient remote failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for [`ImageDownloader`](crate::ImageDownloader)
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local storage settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Post-fetch cleanup settings
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Remote service settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Retry behavior for transient remote faults
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Parse a config from a JSON string and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file and validate it
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Check values that serde alone cannot reject
    pub fn validate(&self) -> Result<()> {
        if self.remote.base_url.trim().is_empty() {
            return Err(config_error("base_url must not be empty", "remote.base_url"));
        }
        if url::Url::parse(&self.remote.base_url).is_err() {
            return Err(config_error(
                format!("base_url is not a valid URL: {}", self.remote.base_url),
                "remote.base_url",
            ));
        }
        if self.remote.page_size == 0 {
            return Err(config_error(
                "page_size must be at least 1",
                "remote.page_size",
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff_multiplier must be a finite number >= 1.0",
                "retry.backoff_multiplier",
            ));
        }
        if self.cleanup.retention.suffixes().iter().any(|s| s.is_empty()) {
            return Err(config_error(
                "retention suffixes must not be empty strings",
                "cleanup.retention",
            ));
        }
        Ok(())
    }

    /// Base download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://www.instagram.com".to_string()
}

fn default_user_agent() -> String {
    format!("imagefeed-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_page_size() -> usize {
    12
}

fn default_request_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_query_hash() -> String {
    "69cba40317214236af40e7efa697781d".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
