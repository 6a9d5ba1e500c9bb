//! AWS Textract OCR backend.
//!
//! Textract reads text but does not map it onto invoice fields, so every
//! document comes back as [`Extraction::RawText`] with the detected lines
//! joined by spaces. The synchronous `DetectDocumentText` call accepts
//! images and single-page PDFs; larger PDFs are rejected by the service
//! and recorded as error results.

use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_textract::Client;
use aws_sdk_textract::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_textract::primitives::Blob;
use aws_sdk_textract::types::{Block, BlockType, Document};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::client::cancellable;
use super::response::mime_type_for;
use super::{Extraction, Extractor, Result};
use crate::error::{ConfigError, RemoteError};
use crate::models::config::TextractConfig;

/// Service error codes worth retrying.
const RETRYABLE_CODES: &[&str] = &[
    "ThrottlingException",
    "ProvisionedThroughputExceededException",
    "InternalServerError",
];

/// [`Extractor`] that sends each document to AWS Textract.
#[derive(Clone)]
pub struct TextractExtractor {
    client: Client,
}

impl TextractExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the standard AWS configuration chain.
    ///
    /// Fails when no region can be resolved, since every request would
    /// fail the same way.
    pub async fn from_config(config: &TextractConfig) -> std::result::Result<Self, ConfigError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let Some(region) = sdk_config.region() else {
            return Err(ConfigError::Invalid {
                field: "textract.region".to_string(),
                reason: "no AWS region configured (set textract.region or AWS_REGION)".to_string(),
            });
        };
        debug!("Using AWS Textract in {}", region);

        Ok(Self::new(Client::new(&sdk_config)))
    }
}

#[async_trait]
impl Extractor for TextractExtractor {
    async fn submit_and_extract(&self, path: &Path, cancel: &CancellationToken) -> Result<Extraction> {
        mime_type_for(path)?;
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        let data = tokio::fs::read(path).await?;

        let request = self
            .client
            .detect_document_text()
            .document(Document::builder().bytes(Blob::new(data)).build())
            .send();
        let output = cancellable(cancel, async { request.await.map_err(sdk_error) }).await?;

        let text = line_text(output.blocks());
        if text.is_empty() {
            return Err(RemoteError::EmptyResponse);
        }
        info!("Textract read {} characters from {}", text.len(), path.display());
        Ok(Extraction::RawText(text))
    }
}

/// Text of every `LINE` block, in reading order, separated by spaces.
fn line_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter(|block| block.block_type() == Some(&BlockType::Line))
        .filter_map(|block| block.text())
        .collect::<Vec<_>>()
        .join(" ")
}

fn sdk_error<E, R>(err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let retryable = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(_) => err.code().is_some_and(|code| RETRYABLE_CODES.contains(&code)),
        _ => false,
    };
    RemoteError::Aws {
        message: DisplayErrorContext(&err).to_string(),
        retryable,
    }
}
