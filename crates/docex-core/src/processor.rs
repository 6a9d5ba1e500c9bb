//! Single-document processing: one file in, one [`ExtractionResult`] out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::RemoteError;
use crate::models::config::RetryConfig;
use crate::models::{DocumentRef, ExtractedFields, ExtractionResult, RAW_RESPONSE_KEY};
use crate::remote::{Extraction, Extractor};

/// Bounded exponential backoff for transient remote errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Runs one document through an [`Extractor`] and never fails: every
/// error becomes an error result.
#[derive(Clone)]
pub struct DocumentProcessor {
    extractor: Arc<dyn Extractor>,
    retry: RetryPolicy,
}

impl DocumentProcessor {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self {
            extractor,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn process(&self, document: DocumentRef, cancel: &CancellationToken) -> ExtractionResult {
        let start = Instant::now();
        let (outcome, attempts) = self.extract_with_retry(&document, cancel).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Extraction::Fields(fields)) => ExtractionResult::success(document, fields),
            Ok(Extraction::RawText(text)) => {
                let mut fields = ExtractedFields::new();
                fields.insert(RAW_RESPONSE_KEY.to_string(), serde_json::Value::String(text));
                ExtractionResult::success(document, fields)
            }
            Err(e) => {
                error!("Error processing {}: {}", document, e);
                ExtractionResult::error(document, e.to_string())
            }
        };

        if result.is_success() {
            info!("Processed {} in {}ms", result.document(), elapsed_ms);
        }

        result.with_timing(elapsed_ms).with_attempts(attempts)
    }

    async fn extract_with_retry(
        &self,
        document: &DocumentRef,
        cancel: &CancellationToken,
    ) -> (Result<Extraction, RemoteError>, u32) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.extractor.submit_and_extract(document.path(), cancel).await;

            let err = match outcome {
                Ok(extraction) => return (Ok(extraction), attempt),
                Err(e) => e,
            };

            if !err.is_transient() || attempt > self.retry.max_retries {
                return (Err(err), attempt);
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                "Transient error for {} ({}), retry {}/{} in {:?}",
                document, err, attempt, self.retry.max_retries, delay
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Cancelled while backing off for {}", document);
                    return (Err(RemoteError::Cancelled), attempt);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::models::Status;

    /// Fails with the queued errors, then succeeds.
    struct FlakyExtractor {
        errors: Mutex<Vec<RemoteError>>,
        calls: AtomicU32,
    }

    impl FlakyExtractor {
        fn new(mut errors: Vec<RemoteError>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Extractor for FlakyExtractor {
        async fn submit_and_extract(&self, _path: &Path, _cancel: &CancellationToken) -> crate::remote::Result<Extraction> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.errors.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok(Extraction::Fields(json!({"Invoice Number": "X-1"}).as_object().cloned().unwrap())),
            }
        }
    }

    struct RawExtractor;

    #[async_trait]
    impl Extractor for RawExtractor {
        async fn submit_and_extract(&self, _path: &Path, _cancel: &CancellationToken) -> crate::remote::Result<Extraction> {
            Ok(Extraction::RawText("no json here".to_string()))
        }
    }

    fn unavailable() -> RemoteError {
        RemoteError::Status {
            status: 503,
            body: "overloaded".to_string(),
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_success() {
        let processor = DocumentProcessor::new(Arc::new(FlakyExtractor::new(vec![])));
        let result = processor.process(DocumentRef::new("a.pdf"), &CancellationToken::new()).await;

        assert_eq!(result.status(), Status::Success);
        assert_eq!(result.fields().unwrap()["Invoice Number"], "X-1");
        assert_eq!(result.attempts(), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_is_contained() {
        let extractor = Arc::new(FlakyExtractor::new(vec![RemoteError::ProcessingFailed(
            "files/a".to_string(),
        )]));
        let processor = DocumentProcessor::new(extractor.clone()).with_retry(fast_retry(3));

        let result = processor.process(DocumentRef::new("a.pdf"), &CancellationToken::new()).await;

        assert_eq!(result.status(), Status::Error);
        assert!(!result.error_message().unwrap().is_empty());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let extractor = Arc::new(FlakyExtractor::new(vec![unavailable(), unavailable()]));
        let processor = DocumentProcessor::new(extractor.clone()).with_retry(fast_retry(2));

        let result = processor.process(DocumentRef::new("a.pdf"), &CancellationToken::new()).await;

        assert!(result.is_success());
        assert_eq!(result.attempts(), 3);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let extractor = Arc::new(FlakyExtractor::new(vec![unavailable(), unavailable(), unavailable()]));
        let processor = DocumentProcessor::new(extractor.clone()).with_retry(fast_retry(1));

        let result = processor.process(DocumentRef::new("a.pdf"), &CancellationToken::new()).await;

        assert_eq!(result.status(), Status::Error);
        assert!(result.error_message().unwrap().contains("503"));
        assert_eq!(result.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_retrying() {
        let extractor = Arc::new(FlakyExtractor::new(vec![unavailable(), unavailable()]));
        let processor = DocumentProcessor::new(extractor.clone()).with_retry(fast_retry(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = processor.process(DocumentRef::new("a.pdf"), &cancel).await;

        assert_eq!(result.error_message(), Some("cancelled"));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_raw_text_is_kept() {
        let processor = DocumentProcessor::new(Arc::new(RawExtractor));
        let result = processor.process(DocumentRef::new("a.pdf"), &CancellationToken::new()).await;

        assert_eq!(result.status(), Status::Success);
        assert_eq!(result.raw_response(), Some("no json here"));
    }
}
