//! Error types for the docex-core library.

use thiserror::Error;

/// Main error type for the docex library.
#[derive(Error, Debug)]
pub enum DocexError {
    /// Remote extraction service error.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid caller input (bad root directory, worker count out of range, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Report serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while talking to the remote document service.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The document could not be read from disk.
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    /// The document type is not accepted by the service.
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),

    /// Transport-level failure (connect, timeout, TLS, body).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The service reported that it could not process the upload.
    #[error("remote processing failed for {0}")]
    ProcessingFailed(String),

    /// The uploaded file reached a state we do not know how to handle.
    #[error("unexpected file state {state} for {file}")]
    UnexpectedState { file: String, state: String },

    /// The file did not become ready within the configured wait.
    #[error("file {file} not ready after {waited_secs}s")]
    Timeout { file: String, waited_secs: u64 },

    /// The extraction request returned no text.
    #[error("service returned an empty response")]
    EmptyResponse,

    /// A service payload did not have the expected shape.
    #[error("failed to decode service response: {0}")]
    Decode(String),

    /// An AWS SDK call failed; `retryable` marks throttling, server-side
    /// and transport failures.
    #[error("AWS request failed: {message}")]
    Aws { message: String, retryable: bool },

    /// The batch was cancelled while this document was in flight.
    #[error("cancelled")]
    Cancelled,
}

impl RemoteError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, rate limiting (429) and server errors (5xx)
    /// are transient; everything else is a property of the document or
    /// of the request and will fail again.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            RemoteError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            RemoteError::Aws { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

/// Errors related to configuration and credentials.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required credential is not set in the environment.
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    /// A configuration value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the docex library.
pub type Result<T> = std::result::Result<T, DocexError>;
