//! Process command - run the agent on a single invoice file.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use tracing::{debug, info};

use nfagent_core::rules::{self, amounts::format_amount};
use nfagent_core::{ExtractorKind, InvoiceRecord, Mode, RunReport, SessionState, ThreadId};

use super::{build_orchestrator, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (XML, PDF, HTML or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Persistence mode: single or accumulate (default: from config)
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Directory for the written spreadsheets (overrides config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Validate the saved record
    #[arg(long)]
    validate: bool,

    /// Thread id to record in the session (default: random)
    #[arg(long)]
    thread_id: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(dir) = &args.output_dir {
        config.storage.output_dir = dir.clone();
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    if ExtractorKind::from_path(&args.input).is_none() {
        anyhow::bail!(
            "Unsupported file format: {} (expected .xml, .pdf, .html or an image)",
            args.input.display()
        );
    }

    let mode = args.mode.unwrap_or(config.agent.default_mode);
    let thread_id = args
        .thread_id
        .clone()
        .map(ThreadId::from)
        .unwrap_or_else(ThreadId::generate);

    let orchestrator = build_orchestrator(&config)?;
    let mut session = SessionState::new(thread_id, mode);

    info!("Processing file: {} ({} mode)", args.input.display(), mode);

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(format!("Processing {}...", file_label(&args.input)));
    pb.enable_steady_tick(Duration::from_millis(120));

    let outcome = orchestrator.process_file(&mut session, &args.input).await;
    pb.finish_and_clear();
    let report = outcome?;

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&json_summary(&session, &report))?,
        OutputFormat::Text => text_summary(&session, &report),
    };
    println!("{}", output);

    match &report.saved {
        Some(saved) if args.validate => {
            let issues = rules::validate(&saved.record);
            if issues.is_empty() {
                eprintln!("{} Record passed validation", style("✓").green());
            } else {
                eprintln!("{}", style("Validation issues:").yellow());
                for issue in &issues {
                    eprintln!("  - {}", issue);
                }
            }
        }
        Some(_) => {}
        None => {
            eprintln!(
                "{} No record was saved for {}",
                style("!").yellow(),
                args.input.display()
            );
            if let Some(raw) = &session.last_extraction {
                eprintln!("{}", style("Extracted text:").dim());
                eprintln!("{}", raw);
            }
        }
    }

    debug!("Total processing time: {:?}", start.elapsed());
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn json_summary(session: &SessionState, report: &RunReport) -> Value {
    json!({
        "thread_id": session.thread_id,
        "mode": session.mode,
        "answer": report.answer,
        "output_path": report.saved.as_ref().map(|s| s.path.display().to_string()),
        "record": report.saved.as_ref().map(|s| Value::Object(s.record.populated_fields())),
        "turns": report.turns,
    })
}

pub(crate) fn text_summary(session: &SessionState, report: &RunReport) -> String {
    let mut output = String::new();

    if let Some(saved) = &report.saved {
        output.push_str(&format_record(&saved.record));
        output.push_str(&format!("\nSaved to: {}\n", saved.path.display()));
    }

    output.push_str(&format!("\n{}\n", report.answer.trim()));
    output.push_str(&format!(
        "\nThread: {} ({} mode, {} model turns)",
        session.thread_id, session.mode, report.turns
    ));
    output
}

pub(crate) fn format_record(record: &InvoiceRecord) -> String {
    let dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let money = |v: Option<rust_decimal::Decimal>| {
        v.map(|d| format!("R$ {}", format_amount(d)))
            .unwrap_or_else(|| "-".to_string())
    };

    let mut output = String::new();
    output.push_str(&format!("Invoice: {}\n", dash(&record.invoice_number)));
    output.push_str(&format!("Date: {}\n", dash(&record.emission_date)));
    if let Some(key) = &record.access_key {
        output.push_str(&format!("Access key: {}\n", key));
    }
    output.push('\n');

    output.push_str("Issuer:\n");
    output.push_str(&format!("  {}\n", dash(&record.issuer_name)));
    if let Some(id) = &record.issuer_tax_id {
        output.push_str(&format!("  CNPJ/CPF: {}\n", id));
    }
    if let Some(address) = &record.issuer_address {
        output.push_str(&format!("  {}\n", address));
    }
    if let Some(city) = &record.issuer_municipality {
        output.push_str(&format!("  {}\n", city));
    }
    output.push('\n');

    output.push_str("Recipient:\n");
    output.push_str(&format!("  {}\n", dash(&record.recipient_name)));
    if let Some(id) = &record.recipient_tax_id {
        output.push_str(&format!("  CNPJ/CPF: {}\n", id));
    }
    if let Some(address) = &record.recipient_address {
        output.push_str(&format!("  {}\n", address));
    }
    if let Some(city) = &record.recipient_municipality {
        output.push_str(&format!("  {}\n", city));
    }
    output.push('\n');

    output.push_str("Values:\n");
    output.push_str(&format!("  Total:    {}\n", money(record.total_value)));
    output.push_str(&format!("  Tax base: {}\n", money(record.tax_base)));
    output.push_str(&format!("  ISS:      {}\n", money(record.iss_value)));
    output.push_str(&format!("  ICMS:     {}\n", money(record.icms_value)));

    if let Some(description) = &record.service_description {
        output.push_str(&format!("\nService: {}\n", description));
    }

    output
}
