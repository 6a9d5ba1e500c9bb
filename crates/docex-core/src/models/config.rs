//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Main configuration for the docex pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocexConfig {
    /// Remote service configuration.
    pub remote: RemoteConfig,

    /// AWS Textract settings, used when `remote.backend` is `textract`.
    pub textract: TextractConfig,

    /// Generation parameters sent with every extraction request.
    pub generation: GenerationConfig,

    /// Upload readiness polling.
    pub polling: PollingConfig,

    /// Batch orchestration.
    pub batch: BatchConfig,

    /// Retry policy for transient remote errors.
    pub retry: RetryConfig,

    /// Report output.
    pub report: ReportConfig,
}

/// Which service documents are sent to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Gemini: fields extracted by the model as JSON.
    #[default]
    Gemini,
    /// AWS Textract: OCR only, the document text is kept as `raw_response`.
    Textract,
}

/// Remote document service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Service documents are sent to.
    pub backend: Backend,

    /// Base URL of the generative language API.
    pub base_url: String,

    /// Model used for extraction.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Gemini,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash-exp".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// AWS Textract configuration. Credentials come from the standard AWS
/// chain (`AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY`, profiles, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextractConfig {
    /// AWS region; falls back to `AWS_REGION` and the AWS profile.
    pub region: Option<String>,
}

/// Sampling parameters for the extraction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,

    /// Nucleus sampling probability mass.
    pub top_p: f32,

    /// Top-k sampling cutoff.
    pub top_k: u32,

    /// Maximum number of output tokens.
    pub max_output_tokens: u32,

    /// MIME type the model is asked to answer with.
    pub response_mime_type: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_mime_type: "application/json".to_string(),
        }
    }
}

/// How to wait for an uploaded file to become ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between two status checks, in milliseconds.
    pub interval_ms: u64,

    /// Give up after this many seconds.
    pub max_wait_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            max_wait_secs: 300,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Upper bound on concurrent documents.
pub const MAX_WORKERS: usize = 256;

/// Batch orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of documents processed concurrently (1 to [`MAX_WORKERS`]).
    pub workers: usize,

    /// Accepted file extensions (matched case-insensitively).
    pub extensions: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            extensions: vec!["pdf".to_string()],
        }
    }
}

/// Retry policy for transient remote failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,

    /// Delay before the first retry, doubled on every further retry.
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 2000,
            max_backoff_ms: 30_000,
        }
    }
}

/// Report output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory reports are written to.
    pub output_dir: PathBuf,

    /// File name prefix; the unix timestamp and `.json` are appended.
    pub prefix: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            prefix: "batch_index_results".to_string(),
        }
    }
}

impl DocexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_WORKERS).contains(&self.batch.workers) {
            return Err(ConfigError::Invalid {
                field: "batch.workers".to_string(),
                reason: format!("must be between 1 and {}", MAX_WORKERS),
            });
        }
        if self.batch.extensions.is_empty() {
            return Err(ConfigError::Invalid {
                field: "batch.extensions".to_string(),
                reason: "at least one extension is required".to_string(),
            });
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "polling.interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.report.prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "report.prefix".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// API credentials, read once at startup.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into() }
    }

    /// Read the API key from the named environment variable.
    ///
    /// An unset or blank variable is an error so that a missing key is
    /// reported before any document is touched.
    pub fn from_env(var: &str) -> Result<Self, ConfigError> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key.trim())),
            _ => Err(ConfigError::MissingCredential(var.to_string())),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("api_key", &"<redacted>").finish()
    }
}
