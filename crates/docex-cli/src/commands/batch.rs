//! Batch command - extract fields from every document under a directory.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, warn};

use docex_core::prompts::INVOICE_FIELDS;
use docex_core::{
    discover, orchestrator_from_config, write_report, BatchResults, CancellationToken,
    JsonReportSink,
};

use super::load_config;

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Root directory to scan for documents
    #[arg(required = true)]
    root: PathBuf,

    /// Number of parallel workers (default: 5)
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Directory the JSON report is written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also write a summary CSV next to the report
    #[arg(long)]
    summary: bool,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    if !args.root.is_dir() {
        error!("Invalid directory: {}", args.root.display());
        anyhow::bail!("Invalid directory: {}", args.root.display());
    }

    let mut config = load_config(config_path)?;
    if let Some(workers) = args.workers {
        config.batch.workers = workers;
    }
    if let Some(output_dir) = args.output_dir {
        config.report.output_dir = output_dir;
    }
    config.validate()?;

    // Fail before any work if credentials are missing.
    let orchestrator = orchestrator_from_config(&config).await?;

    let documents = discover(&args.root, &config.batch.extensions);
    println!(
        "{} Found {} documents to process with {} workers",
        style("ℹ").blue(),
        documents.len(),
        orchestrator.workers()
    );

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling remaining documents");
                cancel.cancel();
            }
        })
    };

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let results = orchestrator
        .run_documents(documents, &cancel, |result, done, _total| {
            if let Some(message) = result.error_message() {
                pb.println(format!(
                    "{} {}: {}",
                    style("✗").red(),
                    result.document().file_name(),
                    message
                ));
            }
            pb.set_position(done as u64);
        })
        .await;

    interrupt.abort();
    pb.finish_with_message("Complete");

    let sink = JsonReportSink::from_config(&config.report);
    let report_path = write_report(&results, &sink)?;
    println!(
        "{} Report written to {}",
        style("✓").green(),
        report_path.display()
    );

    if args.summary {
        let summary_path = report_path.with_extension("csv");
        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Indexing complete in {:?}",
        style("✓").green(),
        start.elapsed()
    );
    for line in results.summary().to_string().lines() {
        println!("   {}", line);
    }

    if cancel.is_cancelled() {
        anyhow::bail!("Batch was interrupted; partial report saved to {}", report_path.display());
    }

    Ok(())
}

/// One CSV row per document: status, the known invoice fields, timing and error.
fn write_summary(path: &Path, results: &BatchResults) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["filename", "status"];
    header.extend_from_slice(INVOICE_FIELDS);
    header.extend_from_slice(&["processing_time_ms", "error"]);
    wtr.write_record(&header)?;

    for (document, result) in results.iter() {
        let mut row = vec![document.to_string(), result.status().to_string()];
        for field in INVOICE_FIELDS {
            let value = result
                .fields()
                .and_then(|fields| fields.get(*field))
                .map(|value| match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            row.push(value);
        }
        row.push(result.processing_time_ms().to_string());
        row.push(result.error_message().unwrap_or("").to_string());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docex_core::{DocumentRef, ExtractionResult};
    use serde_json::json;

    #[test]
    fn test_summary_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let results: BatchResults = [
            ExtractionResult::success(
                DocumentRef::new("a.pdf"),
                json!({"Invoice Number": "INV-1", "Quantity": 12})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
            ExtractionResult::error(DocumentRef::new("b.pdf"), "upload failed"),
        ]
        .into_iter()
        .collect();

        write_summary(&path, &results).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("filename,status,Exporter,Invoice Number"));
        assert!(lines[1].starts_with("a.pdf,success,,INV-1"));
        assert!(lines[1].contains(",12,"));
        assert!(lines[2].starts_with("b.pdf,error"));
        assert!(lines[2].ends_with("upload failed"));
    }
}
