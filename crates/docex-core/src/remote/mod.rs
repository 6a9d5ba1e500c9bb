//! Remote extraction: sending documents to a generative-AI or OCR
//! service and turning its answer into extracted fields.
//!
//! Two seams:
//! - [`DocumentService`] is the raw upload/status/generate contract.
//!   [`GeminiService`] talks to the Gemini REST API.
//! - [`Extractor`] is what the processor depends on.
//!   [`RemoteExtractor`] implements it on top of any `DocumentService`;
//!   [`TextractExtractor`] implements it directly against AWS Textract.

mod client;
mod gemini;
mod response;
mod textract;

pub use client::RemoteExtractor;
pub use gemini::GeminiService;
pub use textract::TextractExtractor;
pub use response::{mime_type_for, parse_extraction};

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::RemoteError;
use crate::models::ExtractedFields;

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Handle to a file uploaded to the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Service-side resource name (e.g. `files/abc123`).
    pub name: String,
    /// URI used to reference the file in generation requests.
    pub uri: String,
    /// Declared MIME type of the upload.
    pub mime_type: String,
}

/// Processing state of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Processing,
    Active,
    Failed,
    /// Any state name the client does not recognise.
    Other(String),
}

impl FileState {
    pub fn parse(state: &str) -> Self {
        match state {
            "PROCESSING" => FileState::Processing,
            "ACTIVE" => FileState::Active,
            "FAILED" => FileState::Failed,
            other => FileState::Other(other.to_string()),
        }
    }
}

/// What the model returned for a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The response parsed as a JSON object.
    Fields(ExtractedFields),
    /// The response was not a JSON object; the text is kept as-is.
    RawText(String),
}

/// Contract of the remote document-understanding service.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Upload document bytes with their MIME type.
    async fn upload(&self, data: Vec<u8>, mime_type: &str, display_name: &str) -> Result<RemoteFile>;

    /// Current processing state of an uploaded file.
    async fn file_state(&self, file: &RemoteFile) -> Result<FileState>;

    /// Ask the model to extract fields from an uploaded file.
    async fn generate(&self, file: &RemoteFile, prompt: &str) -> Result<String>;

    /// Service name for logging.
    fn service_name(&self) -> &'static str;
}

/// Submits one document and returns the extraction.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn submit_and_extract(&self, path: &Path, cancel: &CancellationToken) -> Result<Extraction>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_state_parse() {
        assert_eq!(FileState::parse("ACTIVE"), FileState::Active);
        assert_eq!(FileState::parse("PROCESSING"), FileState::Processing);
        assert_eq!(FileState::parse("FAILED"), FileState::Failed);
        assert_eq!(
            FileState::parse("STATE_UNSPECIFIED"),
            FileState::Other("STATE_UNSPECIFIED".to_string())
        );
    }
}
