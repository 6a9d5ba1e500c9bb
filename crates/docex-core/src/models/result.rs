//! Per-document extraction results.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Field name to value mapping returned by the extraction model.
pub type ExtractedFields = serde_json::Map<String, serde_json::Value>;

/// Key under which an unparseable model response is preserved.
pub const RAW_RESPONSE_KEY: &str = "raw_response";

/// Identifies one unit of work: the path of a discovered document.
///
/// Serialized as a string; bytes that are not valid UTF-8 are replaced
/// with U+FFFD, so any discovered path can be written to a report.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentRef(PathBuf);

impl DocumentRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// File name for display, falling back to the full path.
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.to_string())
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl Serialize for DocumentRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string_lossy())
    }
}

impl<'de> Deserialize<'de> for DocumentRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|path| Self(PathBuf::from(path)))
    }
}

impl From<PathBuf> for DocumentRef {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for DocumentRef {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

/// Outcome status as written to reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::Error => write!(f, "error"),
        }
    }
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Fields were extracted (possibly only a raw response fallback).
    Success { fields: ExtractedFields },
    /// The document could not be processed.
    Error { message: String },
}

/// Outcome of processing one document. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ResultRecord", try_from = "ResultRecord")]
pub struct ExtractionResult {
    document: DocumentRef,
    outcome: Outcome,
    processing_time_ms: u64,
    attempts: u32,
}

impl ExtractionResult {
    pub fn success(document: DocumentRef, fields: ExtractedFields) -> Self {
        Self {
            document,
            outcome: Outcome::Success { fields },
            processing_time_ms: 0,
            attempts: 1,
        }
    }

    /// An error result. Blank messages are replaced so the report always
    /// carries a reason.
    pub fn error(document: DocumentRef, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message
        };
        Self {
            document,
            outcome: Outcome::Error { message },
            processing_time_ms: 0,
            attempts: 1,
        }
    }

    pub fn with_timing(mut self, processing_time_ms: u64) -> Self {
        self.processing_time_ms = processing_time_ms;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn status(&self) -> Status {
        match self.outcome {
            Outcome::Success { .. } => Status::Success,
            Outcome::Error { .. } => Status::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == Status::Success
    }

    pub fn fields(&self) -> Option<&ExtractedFields> {
        match &self.outcome {
            Outcome::Success { fields } => Some(fields),
            Outcome::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Error { message } => Some(message),
        }
    }

    /// Raw model text, when the response could not be parsed as fields.
    pub fn raw_response(&self) -> Option<&str> {
        self.fields()
            .and_then(|f| f.get(RAW_RESPONSE_KEY))
            .and_then(|v| v.as_str())
    }

    pub fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Serialized shape of a result: `status` plus nullable `response`/`error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResultRecord {
    file_path: DocumentRef,
    status: Status,
    response: Option<ExtractedFields>,
    error: Option<String>,
    #[serde(default)]
    processing_time_ms: u64,
    #[serde(default = "default_attempts")]
    attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl From<ExtractionResult> for ResultRecord {
    fn from(result: ExtractionResult) -> Self {
        let (status, response, error) = match result.outcome {
            Outcome::Success { fields } => (Status::Success, Some(fields), None),
            Outcome::Error { message } => (Status::Error, None, Some(message)),
        };
        Self {
            file_path: result.document,
            status,
            response,
            error,
            processing_time_ms: result.processing_time_ms,
            attempts: result.attempts,
        }
    }
}

impl TryFrom<ResultRecord> for ExtractionResult {
    type Error = String;

    fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
        let outcome = match (record.status, record.response, record.error) {
            (Status::Success, Some(fields), None) => Outcome::Success { fields },
            (Status::Error, None, Some(message)) => Outcome::Error { message },
            (Status::Success, _, _) => {
                return Err(format!(
                    "{}: success requires a response and no error",
                    record.file_path
                ));
            }
            (Status::Error, _, _) => {
                return Err(format!(
                    "{}: error requires a message and no response",
                    record.file_path
                ));
            }
        };
        Ok(Self {
            document: record.file_path,
            outcome,
            processing_time_ms: record.processing_time_ms,
            attempts: record.attempts,
        })
    }
}
