pub mod prompt;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::{MergeMode, Settings};
use crate::error::DedupeResult;
use crate::model::RawContact;
use crate::ops::merge_ops::AutomaticPolicy;
use crate::ops::pipeline_ops::{self, PipelineOutput};
use crate::report::RunSummary;
use prompt::PromptDecisionProvider;

/// Normalize and deduplicate contacts gathered from several address books.
#[derive(Debug, Parser)]
#[command(name = "abmerge")]
#[command(version)]
pub struct Args {
    /// JSON array of parsed contact records
    pub input: PathBuf,

    /// TOML settings file
    #[arg(short, long, env = "ABMERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where to write the merged contacts as JSON (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Where to write the plain-text changelog (stderr when omitted)
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Where to write the full change report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Ask before merging each cluster
    #[arg(short, long)]
    pub interactive: bool,

    /// Override the default phone region
    #[arg(long, env = "ABMERGE_REGION")]
    pub region: Option<String>,
}

/// Settings from `--config` (or defaults) with command-line overrides applied.
pub fn load_settings(args: &Args) -> DedupeResult<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(region) = &args.region {
        settings.default_region = region.trim().to_uppercase();
    }
    if args.interactive {
        settings.merge.mode = MergeMode::Interactive;
    }
    settings.validate()?;
    Ok(settings)
}

pub fn load_records(path: &Path) -> DedupeResult<Vec<RawContact>> {
    let json_str = std::fs::read_to_string(path)?;
    let records: Vec<RawContact> = serde_json::from_str(&json_str)?;
    info!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Runs the engine with prompts on stdin/stderr in interactive mode, or
/// the automatic policy otherwise.
pub fn execute(records: &[RawContact], settings: &Settings) -> DedupeResult<PipelineOutput> {
    match settings.merge.mode {
        MergeMode::Automatic => pipeline_ops::run(records, settings, &mut AutomaticPolicy),
        MergeMode::Interactive => {
            let stdin = io::stdin();
            let mut provider = PromptDecisionProvider::new(stdin.lock(), io::stderr());
            pipeline_ops::run(records, settings, &mut provider)
        }
    }
}

pub fn run(args: &Args) -> Result<RunSummary> {
    let settings = load_settings(args).context("Failed to load settings")?;
    let records = load_records(&args.input)
        .with_context(|| format!("Failed to read records from {}", args.input.display()))?;

    let output = execute(&records, &settings).context("Deduplication aborted")?;

    let contacts_json = serde_json::to_string_pretty(&output.contacts)?;
    match &args.output {
        Some(path) => std::fs::write(path, contacts_json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", contacts_json)?;
        }
    }

    let changelog = output.report.to_text();
    match &args.report {
        Some(path) => std::fs::write(path, changelog)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => eprint!("{}", changelog),
    }

    if let Some(path) = &args.report_json {
        let report_json = serde_json::to_string_pretty(&output.report)?;
        std::fs::write(path, report_json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(output.report.summary)
}
