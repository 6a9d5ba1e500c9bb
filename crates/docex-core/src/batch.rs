//! Batch orchestration: fan documents out over a bounded worker pool and
//! collect one result per document.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discovery::discover;
use crate::error::{DocexError, Result};
use crate::models::{DocumentRef, ExtractionResult, MAX_WORKERS};
use crate::processor::DocumentProcessor;
use crate::report::BatchSummary;

/// Message recorded for documents that never started because the batch
/// was cancelled.
pub const CANCELLED_MESSAGE: &str = "cancelled before processing";

/// Results of one batch run, keyed by document.
#[derive(Debug, Clone, Default)]
pub struct BatchResults {
    results: BTreeMap<DocumentRef, ExtractionResult>,
}

impl BatchResults {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, document: &DocumentRef) -> Option<&ExtractionResult> {
        self.results.get(document)
    }

    pub fn contains(&self, document: &DocumentRef) -> bool {
        self.results.contains_key(document)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DocumentRef, &ExtractionResult)> {
        self.results.iter()
    }

    pub fn results(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results.values()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_results(self.results.values())
    }

    fn insert(&mut self, result: ExtractionResult) {
        let document = result.document().clone();
        if self.results.insert(document.clone(), result).is_some() {
            warn!("Duplicate result for {}, keeping the latest", document);
        }
    }
}

impl FromIterator<ExtractionResult> for BatchResults {
    fn from_iter<I: IntoIterator<Item = ExtractionResult>>(iter: I) -> Self {
        let mut results = Self::default();
        for result in iter {
            results.insert(result);
        }
        results
    }
}

/// Runs a [`DocumentProcessor`] over many documents with at most
/// `workers` in flight.
pub struct BatchOrchestrator {
    processor: DocumentProcessor,
    workers: usize,
    extensions: Vec<String>,
}

impl BatchOrchestrator {
    pub fn new(processor: DocumentProcessor, workers: usize) -> Result<Self> {
        if !(1..=MAX_WORKERS).contains(&workers) {
            return Err(DocexError::InvalidInput(format!(
                "worker count must be between 1 and {}, got {}",
                MAX_WORKERS, workers
            )));
        }
        Ok(Self {
            processor,
            workers,
            extensions: vec!["pdf".to_string()],
        })
    }

    /// File extensions picked up by discovery.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Discover documents under `root` and process all of them.
    ///
    /// `on_result` is called as each document finishes, with the number
    /// of finished documents and the total.
    pub async fn run<F>(&self, root: &Path, cancel: &CancellationToken, on_result: F) -> BatchResults
    where
        F: FnMut(&ExtractionResult, usize, usize),
    {
        let documents = discover(root, &self.extensions);
        self.run_documents(documents, cancel, on_result).await
    }

    /// Process an explicit document list. Duplicate entries are processed
    /// once.
    pub async fn run_documents<F>(
        &self,
        mut documents: Vec<DocumentRef>,
        cancel: &CancellationToken,
        mut on_result: F,
    ) -> BatchResults
    where
        F: FnMut(&ExtractionResult, usize, usize),
    {
        documents.sort();
        documents.dedup();
        let total = documents.len();
        info!("Processing {} documents with {} workers", total, self.workers);

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for document in documents.iter().cloned() {
            let processor = self.processor.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let fallback = document.clone();
                let work = async move {
                    let permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        permit = semaphore.acquire_owned() => permit.ok(),
                    };
                    let Some(_permit) = permit else {
                        debug!("Skipping {}: batch cancelled", document);
                        return ExtractionResult::error(document, CANCELLED_MESSAGE);
                    };
                    processor.process(document, &cancel).await
                };

                match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => {
                        error!("Worker panicked while processing {}", fallback);
                        ExtractionResult::error(fallback, "worker panicked while processing document")
                    }
                }
            });
        }

        let mut results = BatchResults::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    on_result(&result, results.len() + 1, total);
                    results.insert(result);
                }
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        // A task that died without reporting still owes a result.
        for document in documents {
            if !results.contains(&document) {
                let result = ExtractionResult::error(document, "worker task ended without a result");
                on_result(&result, results.len() + 1, total);
                results.insert(result);
            }
        }

        let summary = results.summary();
        info!(
            "Batch finished: {} successful, {} failed",
            summary.successful, summary.failed
        );
        results
    }
}
