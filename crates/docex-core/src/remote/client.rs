//! Upload, wait-until-ready and extraction on top of a document service.

use std::future::Future;
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::response::{mime_type_for, parse_extraction};
use super::{DocumentService, Extraction, Extractor, FileState, RemoteFile, Result};
use crate::error::RemoteError;
use crate::models::config::PollingConfig;
use crate::prompts::EXTRACTION_PROMPT;

/// [`Extractor`] that drives a [`DocumentService`] through one document.
pub struct RemoteExtractor<S> {
    service: S,
    polling: PollingConfig,
}

impl<S: DocumentService> RemoteExtractor<S> {
    pub fn new(service: S, polling: PollingConfig) -> Self {
        Self { service, polling }
    }

    /// Wait until the uploaded file is ready for generation.
    ///
    /// Bounded by `polling.max_wait_secs`; returns early on cancellation.
    pub async fn wait_until_ready(&self, file: &RemoteFile, cancel: &CancellationToken) -> Result<()> {
        let max_wait = self.polling.max_wait();
        let polled = cancellable(cancel, async {
            tokio::time::timeout(max_wait, self.poll_until_active(file))
                .await
                .unwrap_or_else(|_| {
                    Err(RemoteError::Timeout {
                        file: file.name.clone(),
                        waited_secs: max_wait.as_secs(),
                    })
                })
        });
        polled.await
    }

    async fn poll_until_active(&self, file: &RemoteFile) -> Result<()> {
        let interval = self.polling.interval();
        loop {
            match self.service.file_state(file).await? {
                FileState::Active => return Ok(()),
                FileState::Processing => {
                    debug!("{} still processing, next check in {:?}", file.name, interval);
                    tokio::time::sleep(interval).await;
                }
                FileState::Failed => return Err(RemoteError::ProcessingFailed(file.name.clone())),
                FileState::Other(state) => {
                    return Err(RemoteError::UnexpectedState {
                        file: file.name.clone(),
                        state,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl<S: DocumentService> Extractor for RemoteExtractor<S> {
    async fn submit_and_extract(&self, path: &Path, cancel: &CancellationToken) -> Result<Extraction> {
        let mime_type = mime_type_for(path)?;
        let data = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let file = cancellable(cancel, self.service.upload(data, &mime_type, &display_name)).await?;
        info!(
            "Uploaded {} to {} as {}",
            path.display(),
            self.service.service_name(),
            file.uri
        );

        self.wait_until_ready(&file, cancel).await?;

        let text = cancellable(cancel, self.service.generate(&file, EXTRACTION_PROMPT)).await?;
        let extraction = parse_extraction(&text);
        if let Extraction::RawText(_) = extraction {
            debug!("Response for {} is not a JSON object, keeping raw text", path.display());
        }
        Ok(extraction)
    }
}

/// Run `fut` unless `cancel` fires first.
pub(super) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(RemoteError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    /// Scripted service: returns the queued states in order, then
    /// repeats the last one.
    struct ScriptedService {
        states: Mutex<VecDeque<FileState>>,
        response: String,
        polls: AtomicUsize,
        generated: AtomicUsize,
    }

    impl ScriptedService {
        fn new(states: Vec<FileState>, response: &str) -> Self {
            Self {
                states: Mutex::new(states.into()),
                response: response.to_string(),
                polls: AtomicUsize::new(0),
                generated: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentService for ScriptedService {
        async fn upload(&self, data: Vec<u8>, mime_type: &str, display_name: &str) -> Result<RemoteFile> {
            assert!(!data.is_empty());
            Ok(RemoteFile {
                name: format!("files/{}", display_name),
                uri: format!("https://files.test/{}", display_name),
                mime_type: mime_type.to_string(),
            })
        }

        async fn file_state(&self, _file: &RemoteFile) -> Result<FileState> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.pop_front().unwrap())
            } else {
                Ok(states.front().cloned().unwrap_or(FileState::Active))
            }
        }

        async fn generate(&self, _file: &RemoteFile, prompt: &str) -> Result<String> {
            assert_eq!(prompt, EXTRACTION_PROMPT);
            self.generated.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        fn service_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn polling() -> PollingConfig {
        PollingConfig {
            interval_ms: 1000,
            max_wait_secs: 30,
        }
    }

    fn write_pdf(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"%PDF-1.4 test").unwrap();
        path
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_through_processing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(&dir, "invoice.pdf");
        let service = ScriptedService::new(
            vec![FileState::Processing, FileState::Processing, FileState::Active],
            r#"{"Invoice Number": "INV-1"}"#,
        );
        let extractor = RemoteExtractor::new(service, polling());

        let extraction = extractor
            .submit_and_extract(&path, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(extraction, Extraction::Fields(ref f) if f["Invoice Number"] == "INV-1"));
        assert_eq!(extractor.service.polls.load(Ordering::SeqCst), 3);
        assert_eq!(extractor.service.generated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(&dir, "broken.pdf");
        let service = ScriptedService::new(vec![FileState::Processing, FileState::Failed], "{}");
        let extractor = RemoteExtractor::new(service, polling());

        let err = extractor
            .submit_and_extract(&path, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteError::ProcessingFailed(ref name) if name == "files/broken.pdf"));
        assert_eq!(extractor.service.generated.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(&dir, "odd.pdf");
        let service = ScriptedService::new(vec![FileState::Other("STATE_UNSPECIFIED".to_string())], "{}");
        let extractor = RemoteExtractor::new(service, polling());

        let err = extractor
            .submit_and_extract(&path, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteError::UnexpectedState { ref state, .. } if state == "STATE_UNSPECIFIED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(&dir, "slow.pdf");
        let service = ScriptedService::new(vec![FileState::Processing], "{}");
        let extractor = RemoteExtractor::new(
            service,
            PollingConfig {
                interval_ms: 1000,
                max_wait_secs: 5,
            },
        );

        let err = extractor
            .submit_and_extract(&path, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteError::Timeout { waited_secs: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(&dir, "late.pdf");
        let service = ScriptedService::new(vec![FileState::Active], "{}");
        let extractor = RemoteExtractor::new(service, polling());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = extractor.submit_and_extract(&path, &cancel).await.unwrap_err();
        assert!(matches!(err, RemoteError::Cancelled));
    }

    #[tokio::test]
    async fn test_raw_text_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(&dir, "prose.pdf");
        let service = ScriptedService::new(vec![FileState::Active], "The invoice number is INV-9.");
        let extractor = RemoteExtractor::new(service, polling());

        let extraction = extractor
            .submit_and_extract(&path, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            extraction,
            Extraction::RawText("The invoice number is INV-9.".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService::new(vec![FileState::Active], "{}");
        let extractor = RemoteExtractor::new(service, polling());

        let err = extractor
            .submit_and_extract(&dir.path().join("gone.pdf"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteError::Io(_)));
    }
}
