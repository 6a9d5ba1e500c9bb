//! Wiring the pipeline from configuration.

use std::sync::Arc;

use crate::batch::BatchOrchestrator;
use crate::error::Result;
use crate::models::config::{Backend, Credentials, DocexConfig};
use crate::processor::{DocumentProcessor, RetryPolicy};
use crate::remote::{Extractor, GeminiService, RemoteExtractor, TextractExtractor};

/// Processor for the backend selected by `remote.backend`.
///
/// Credentials are resolved here, so a missing Gemini key or AWS region
/// is reported before any document is discovered.
pub async fn processor_from_config(config: &DocexConfig) -> Result<DocumentProcessor> {
    match config.remote.backend {
        Backend::Gemini => {
            let credentials = Credentials::from_env(&config.remote.api_key_env)?;
            gemini_processor(config, credentials)
        }
        Backend::Textract => textract_processor(config).await,
    }
}

/// Batch orchestrator for the backend selected by `remote.backend`.
pub async fn orchestrator_from_config(config: &DocexConfig) -> Result<BatchOrchestrator> {
    let processor = processor_from_config(config).await?;
    orchestrator(config, processor)
}

/// Processor backed by the Gemini service.
pub fn gemini_processor(config: &DocexConfig, credentials: Credentials) -> Result<DocumentProcessor> {
    config.validate()?;
    let service = GeminiService::new(&config.remote, config.generation.clone(), credentials)?;
    Ok(processor(config, RemoteExtractor::new(service, config.polling.clone())))
}

/// Batch orchestrator backed by the Gemini service.
pub fn gemini_orchestrator(config: &DocexConfig, credentials: Credentials) -> Result<BatchOrchestrator> {
    let processor = gemini_processor(config, credentials)?;
    orchestrator(config, processor)
}

/// Processor backed by AWS Textract.
pub async fn textract_processor(config: &DocexConfig) -> Result<DocumentProcessor> {
    config.validate()?;
    let extractor = TextractExtractor::from_config(&config.textract).await?;
    Ok(processor(config, extractor))
}

fn processor(config: &DocexConfig, extractor: impl Extractor + 'static) -> DocumentProcessor {
    DocumentProcessor::new(Arc::new(extractor)).with_retry(RetryPolicy::from(&config.retry))
}

fn orchestrator(config: &DocexConfig, processor: DocumentProcessor) -> Result<BatchOrchestrator> {
    Ok(BatchOrchestrator::new(processor, config.batch.workers)?
        .with_extensions(config.batch.extensions.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_uses_configured_workers() {
        let mut config = DocexConfig::default();
        config.batch.workers = 7;

        let orchestrator = gemini_orchestrator(&config, Credentials::new("key")).unwrap();
        assert_eq!(orchestrator.workers(), 7);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = DocexConfig::default();
        config.batch.extensions.clear();

        assert!(gemini_processor(&config, Credentials::new("key")).is_err());
    }

    #[tokio::test]
    async fn test_missing_gemini_key_is_reported() {
        let mut config = DocexConfig::default();
        config.remote.api_key_env = "DOCEX_TEST_UNSET_KEY".to_string();

        let err = orchestrator_from_config(&config).await.err().unwrap();
        assert!(err.to_string().contains("DOCEX_TEST_UNSET_KEY"), "{err}");
    }

    #[tokio::test]
    async fn test_textract_backend_with_region() {
        let mut config = DocexConfig::default();
        config.remote.backend = Backend::Textract;
        config.textract.region = Some("eu-west-1".to_string());
        config.batch.workers = 3;

        let orchestrator = orchestrator_from_config(&config).await.unwrap();
        assert_eq!(orchestrator.workers(), 3);
    }
}
