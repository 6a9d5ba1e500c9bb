//! Core library for batch invoice field extraction.
//!
//! This crate provides:
//! - Recursive document discovery
//! - Remote extraction backends: Gemini (structured fields) and AWS Textract (OCR text)
//! - Failure-isolating single-document processing with bounded retry
//! - A bounded-concurrency batch orchestrator with cancellation
//! - Batch summaries and timestamped JSON reports

pub mod batch;
pub mod discovery;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod prompts;
pub mod remote;
pub mod report;

pub use batch::{BatchOrchestrator, BatchResults};
pub use discovery::discover;
pub use error::{ConfigError, DocexError, RemoteError, Result};
pub use models::{Backend, Credentials, DocexConfig, DocumentRef, ExtractedFields, ExtractionResult, Outcome, Status};
pub use pipeline::{
    gemini_orchestrator, gemini_processor, orchestrator_from_config, processor_from_config,
    textract_processor,
};
pub use processor::{DocumentProcessor, RetryPolicy};
pub use remote::{
    DocumentService, Extraction, Extractor, GeminiService, RemoteExtractor, TextractExtractor,
};
pub use report::{write_report, BatchReport, BatchSummary, JsonReportSink, ReportSink};

/// Re-exported so callers can cancel a batch without depending on tokio-util directly.
pub use tokio_util::sync::CancellationToken;
