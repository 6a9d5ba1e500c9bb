//! Batch reports: summary counts and the persisted JSON artifact.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::batch::BatchResults;
use crate::error::Result;
use crate::models::config::ReportConfig;
use crate::models::ExtractionResult;

/// Timestamp format used in reports.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Success and error counts of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ExtractionResult>) -> Self {
        results.into_iter().fold(Self::default(), |mut summary, result| {
            summary.total += 1;
            if result.is_success() {
                summary.successful += 1;
            } else {
                summary.failed += 1;
            }
            summary
        })
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total documents: {}", self.total)?;
        writeln!(f, "Successful: {}", self.successful)?;
        write!(f, "Errors: {}", self.failed)
    }
}

/// Everything one batch run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Local time the report was created (`YYYY-MM-DD HH:MM:SS`).
    pub timestamp: String,
    /// Result per document path.
    pub processed_files: BTreeMap<String, ExtractionResult>,
}

impl BatchReport {
    /// Snapshot `results`, stamped with the current local time.
    ///
    /// Keys are the lossy UTF-8 form of each path. Distinct paths that
    /// render the same get a ` (n)` suffix so no result is dropped.
    pub fn new(results: &BatchResults) -> Self {
        let mut processed_files = BTreeMap::new();
        for (document, result) in results.iter() {
            let base = document.path().to_string_lossy().into_owned();
            let mut key = base.clone();
            let mut n = 1;
            while processed_files.contains_key(&key) {
                n += 1;
                key = format!("{} ({})", base, n);
            }
            if n > 1 {
                warn!("{} is not valid UTF-8, reported as {}", document, key);
            }
            processed_files.insert(key, result.clone());
        }
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            processed_files,
        }
    }

    /// Read a previously written report.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Destination for finished batch reports.
pub trait ReportSink: Send + Sync {
    /// Persist `report` and return where it went.
    fn persist(&self, report: &BatchReport) -> Result<PathBuf>;
}

/// Writes each report to `{output_dir}/{prefix}_{unix_secs}.json`.
///
/// Never overwrites: if the name is taken the timestamp suffix is bumped
/// until a free name is found.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    output_dir: PathBuf,
    prefix: String,
}

impl JsonReportSink {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(config.output_dir.clone(), config.prefix.clone())
    }

    fn path_for(&self, epoch: i64) -> PathBuf {
        self.output_dir.join(format!("{}_{}.json", self.prefix, epoch))
    }
}

impl ReportSink for JsonReportSink {
    fn persist(&self, report: &BatchReport) -> Result<PathBuf> {
        // Serialize first so a failure never leaves a partial file behind.
        let json = serde_json::to_vec_pretty(report)?;
        fs::create_dir_all(&self.output_dir)?;

        let mut epoch = Utc::now().timestamp();
        let (path, mut file) = loop {
            let path = self.path_for(epoch);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => epoch += 1,
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = file.write_all(&json).and_then(|()| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        info!("Saved results to {}", path.display());
        Ok(path)
    }
}

/// Build a report from `results` and hand it to `sink`.
pub fn write_report(results: &BatchResults, sink: &dyn ReportSink) -> Result<PathBuf> {
    sink.persist(&BatchReport::new(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::models::DocumentRef;

    fn sample_results() -> BatchResults {
        [
            ExtractionResult::success(
                DocumentRef::new("in/a.pdf"),
                json!({"Invoice Number": "A-1"}).as_object().cloned().unwrap(),
            ),
            ExtractionResult::error(DocumentRef::new("in/b.pdf"), "File processing failed"),
            ExtractionResult::success(
                DocumentRef::new("in/c.pdf"),
                json!({"raw_response": "??"}).as_object().cloned().unwrap(),
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_summary_counts() {
        let summary = sample_results().summary();
        assert_eq!(
            summary,
            BatchSummary {
                total: 3,
                successful: 2,
                failed: 1
            }
        );
        assert_eq!(summary.to_string(), "Total documents: 3\nSuccessful: 2\nErrors: 1");
    }

    #[test]
    fn test_report_shape() {
        let report = BatchReport::new(&sample_results());
        assert!(chrono::NaiveDateTime::parse_from_str(&report.timestamp, TIMESTAMP_FORMAT).is_ok());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["processed_files"]["in/b.pdf"]["status"], "error");
        assert_eq!(
            value["processed_files"]["in/a.pdf"]["response"]["Invoice Number"],
            "A-1"
        );
    }

    #[test]
    fn test_repeated_runs_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path(), "batch_index_results");
        let results = sample_results();

        let first = write_report(&results, &sink).unwrap();
        let second = write_report(&results, &sink).unwrap();

        assert_ne!(first, second);
        for path in [&first, &second] {
            let name = path.file_name().unwrap().to_str().unwrap();
            let suffix = name
                .strip_prefix("batch_index_results_")
                .and_then(|s| s.strip_suffix(".json"))
                .unwrap();
            assert!(suffix.parse::<i64>().is_ok(), "bad name {name}");

            let report = BatchReport::from_file(path).unwrap();
            assert_eq!(report.processed_files.len(), 3);
            assert_eq!(BatchSummary::from_results(report.processed_files.values()).failed, 1);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_keep_every_result() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        fs::create_dir(&docs).unwrap();
        for name in [&b"inv\xff.pdf"[..], b"inv\xfe.pdf", b"ok.pdf"] {
            fs::write(docs.join(OsStr::from_bytes(name)), b"%PDF").unwrap();
        }

        let discovered = crate::discovery::discover(&docs, &["pdf".to_string()]);
        assert_eq!(discovered.len(), 3);
        let results: BatchResults = discovered
            .into_iter()
            .map(|document| ExtractionResult::error(document, "upload failed"))
            .collect();

        let out = dir.path().join("out");
        let path = write_report(&results, &JsonReportSink::new(&out, "r")).unwrap();

        let report = BatchReport::from_file(&path).unwrap();
        assert_eq!(report.processed_files.len(), 3);
        assert_eq!(BatchSummary::from_results(report.processed_files.values()).failed, 3);

        let lossy = docs.join("inv\u{FFFD}.pdf").to_string_lossy().into_owned();
        assert!(report.processed_files.contains_key(&lossy));
        assert!(report.processed_files.contains_key(&format!("{} (2)", lossy)));
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn test_creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path().join("reports").join("2024"), "run");

        let path = write_report(&BatchResults::default(), &sink).unwrap();

        assert!(path.exists());
        let report = BatchReport::from_file(&path).unwrap();
        assert!(report.processed_files.is_empty());
    }
}
