//! Process command - extract fields from a single document.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use docex_core::{processor_from_config, CancellationToken, DocumentRef};

use super::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print compact instead of pretty JSON
    #[arg(long)]
    compact: bool,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    if !args.input.is_file() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let config = load_config(config_path)?;
    let processor = processor_from_config(&config).await?;

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(format!("Extracting fields from {}...", args.input.display()));
    pb.enable_steady_tick(Duration::from_millis(120));

    let cancel = CancellationToken::new();
    let result = tokio::select! {
        result = processor.process(DocumentRef::new(&args.input), &cancel) => result,
        _ = tokio::signal::ctrl_c() => {
            pb.finish_and_clear();
            anyhow::bail!("Interrupted");
        }
    };

    pb.finish_and_clear();

    let output = if args.compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    if let Some(message) = result.error_message() {
        anyhow::bail!("Extraction failed for {}: {}", args.input.display(), message);
    }
    if result.raw_response().is_some() {
        eprintln!(
            "{} No structured fields returned; raw text kept under \"raw_response\"",
            style("!").yellow()
        );
    }

    Ok(())
}
