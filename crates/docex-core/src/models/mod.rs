//! Data models: configuration and per-document results.

pub mod config;
pub mod result;

pub use config::{Backend, Credentials, DocexConfig, MAX_WORKERS};
pub use result::{DocumentRef, ExtractedFields, ExtractionResult, Outcome, Status, RAW_RESPONSE_KEY};
