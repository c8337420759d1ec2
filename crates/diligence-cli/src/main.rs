//! Command-line interface for diligence-rs
//!
//! ## Commands
//!
//! - `inspect`: render a persisted consolidated record with source and
//!   confidence tags
//! - `normalize`: run the quality gate over a statements file
//! - `config`: print the effective configuration

mod render;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use diligence_claims::RecordStore;
use diligence_data::{PeriodStatement, QualityGate};
use diligence_utils::{AppConfig, LogFormat};
use diligence_workflow::DiligenceConfig;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "diligence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect diligence records and financial data quality", long_about = None)]
struct Cli {
    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a consolidated record
    Inspect {
        /// Path to a persisted `<run_id>.json` record
        record: PathBuf,

        /// Only show this section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Run the quality gate over a JSON array of period statements
    Normalize {
        statements: PathBuf,

        /// Quality score at which the normalized series is used
        #[arg(short, long)]
        threshold: Option<u8>,

        /// Configuration file to take gate settings from
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// JSON configuration file; environment overrides apply on top
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let app = AppConfig::default().with_env();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        app.log_format
    };
    diligence_utils::init_tracing_with(format);

    match cli.command {
        Commands::Inspect { record, section } => inspect(&record, section.as_deref()).await,
        Commands::Normalize {
            statements,
            threshold,
            config,
        } => normalize(&statements, threshold, config.as_deref()).await,
        Commands::Config { file } => {
            let config = load_config(file.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn load_config(file: Option<&Path>) -> Result<DiligenceConfig> {
    let config = match file {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            DiligenceConfig::from_json(&json)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => DiligenceConfig::default(),
    }
    .with_env();
    config.validate()?;
    Ok(config)
}

async fn inspect(path: &Path, only: Option<&str>) -> Result<()> {
    let record = RecordStore::load_path(path)
        .await
        .with_context(|| format!("failed to load record {}", path.display()))?;
    info!(run_id = %record.run_id, sections = record.sections.len(), "record loaded");

    if let Some(name) = only {
        let Some(section) = record.get_section(name) else {
            bail!("record {} has no section `{name}`", record.run_id);
        };
        println!("{} ({}, confidence {:.2})", section.kind, section.status, section.confidence);
        println!("{}", render::entries_table(section));
        for note in &section.notes {
            println!("  note: {note}");
        }
        return Ok(());
    }

    println!("Run {} (created {})", record.run_id, record.created_at.to_rfc3339());
    println!("{}", render::sections_table(&record));

    for section in record.sections.values() {
        println!("\n{} ({})", section.kind, section.status);
        if !section.entries.is_empty() {
            println!("{}", render::entries_table(section));
        }
        for note in &section.notes {
            println!("  note: {note}");
        }
    }

    if let Some(series) = &record.series {
        println!(
            "\nfinancial series from {}: {} periods, {} source, quality score {}/100",
            series.origin, series.periods, series.source, series.quality_score
        );
        if let Some(warning) = &series.warning {
            println!("  warning: {warning}");
        }
    }
    for conflict in &record.conflicts {
        let inputs: Vec<String> = conflict
            .inputs
            .iter()
            .map(|input| format!("{}={}", input.agent, input.value))
            .collect();
        println!(
            "conflict on {}: {} resolved to {} ({})",
            conflict.key,
            inputs.join(", "),
            conflict.resolved_value,
            conflict.methodology
        );
    }
    println!("\n{}", render::ledger_line(&record.ledger.summary()));

    let missing = record.missing_sections();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|kind| kind.as_str()).collect();
        println!("missing sections: {}", names.join(", "));
    }
    Ok(())
}

async fn normalize(path: &Path, threshold: Option<u8>, config: Option<&Path>) -> Result<()> {
    let mut quality = load_config(config).await?.quality;
    if let Some(threshold) = threshold {
        quality.threshold = threshold;
    }
    let gate = QualityGate::new(quality)?;

    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read statements {}", path.display()))?;
    let statements: Vec<PeriodStatement> = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a JSON array of period statements", path.display()))?;

    let series = gate.normalize(&statements);
    let selection = series.select_series(gate.config().threshold, "diligence-cli");

    if series.adjustments.is_empty() {
        println!("no adjustments");
    } else {
        println!("{}", render::adjustments_table(&series.adjustments));
    }
    println!("{}", render::series_line(&series, gate.config().threshold));
    if let Some(warning) = &series.warning {
        println!("warning: {warning}");
    }
    let periods: Vec<&str> = selection.periods.iter().map(|p| p.period.as_str()).collect();
    println!("{} series periods: {}", selection.source, periods.join(", "));
    Ok(())
}
