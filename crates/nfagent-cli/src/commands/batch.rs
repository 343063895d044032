//! Batch processing command for multiple invoice files.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, warn};

use nfagent_core::{ExtractorKind, Mode, SessionState, ThreadId};

use super::{build_orchestrator, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern of input files
    #[arg(required = true)]
    input: String,

    /// Persistence mode: single or accumulate
    #[arg(short, long, default_value = "accumulate")]
    mode: Mode,

    /// Directory for the written spreadsheets (overrides config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Outcome of one file.
struct FileResult {
    path: PathBuf,
    output: Option<PathBuf>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(dir) = &args.output_dir {
        config.storage.output_dir = dir.clone();
    }

    let files = collect_files(&args.input)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process ({} mode)",
        style("ℹ").blue(),
        files.len(),
        args.mode
    );

    let orchestrator = build_orchestrator(&config)?;
    let mut session = SessionState::new(ThreadId::generate(), args.mode);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let file_start = Instant::now();

        // Each file gets a fresh conversation; the thread and mode carry over.
        session.transcript.clear();
        session.last_extraction = None;

        let outcome = orchestrator.process_file(&mut session, &path).await;
        let processing_time_ms = file_start.elapsed().as_millis() as u64;

        match outcome {
            Ok(report) => {
                let output = report.saved.map(|s| s.path);
                if output.is_none() {
                    warn!("No record saved for {}", path.display());
                }
                results.push(FileResult {
                    path,
                    error: output
                        .is_none()
                        .then(|| "no record was saved".to_string()),
                    output,
                    processing_time_ms,
                });
            }
            Err(e) => {
                let error_msg = e.to_string();
                if !args.continue_on_error {
                    pb.abandon();
                    error!("Failed to process {}: {}", path.display(), error_msg);
                    anyhow::bail!("Processing {} failed: {}", path.display(), error_msg);
                }
                warn!("Failed to process {}: {}", path.display(), error_msg);
                results.push(FileResult {
                    path,
                    output: None,
                    error: Some(error_msg),
                    processing_time_ms,
                });
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("Complete");

    let successful: Vec<_> = results.iter().filter(|r| r.output.is_some()).collect();
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} saved, {} without a record",
        style(successful.len()).green(),
        style(failed.len()).red()
    );

    if args.mode == Mode::Accumulate && !successful.is_empty() {
        println!("   Master sheet: {}", config.master_path().display());
    } else {
        for result in &successful {
            if let Some(output) = &result.output {
                println!(
                    "   {} -> {} ({}ms)",
                    result.path.display(),
                    output.display(),
                    result.processing_time_ms
                );
            }
        }
    }

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

/// Expand the pattern, keeping files with a supported extension, sorted.
fn collect_files(pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = glob(pattern)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file() && ExtractorKind::from_path(p).is_some())
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.xml", "notes.txt", "c.PNG"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let pattern = format!("{}/*", dir.path().display());
        let files = collect_files(&pattern).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.xml", "b.pdf", "c.PNG"]);
    }
}
