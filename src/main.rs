//! log-anomaly CLI
//!
//! ```bash
//! log-anomaly train --input normal.jsonl --model model.json
//! log-anomaly detect --model model.json --input today.log
//! log-anomaly analyze --train normal.jsonl --input today.jsonl
//! log-anomaly sample-config > log-anomaly.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log_anomaly_rs::config::{generate_sample_config, ConfigLoader};
use log_anomaly_rs::ingest::{read_records, InputFormat};
use log_anomaly_rs::logging::{init_logging, LogConfig};
use log_anomaly_rs::service::{DetectionService, InMemoryVerdictStore, TracingNotifier};
use log_anomaly_rs::{AnomalyEngine, LogRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "log-anomaly")]
#[command(version)]
#[command(about = "Unsupervised log anomaly detection", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, env = "LOG_ANOMALY_CONFIG")]
    config: Option<String>,

    /// Log level or filter directive (overrides the configuration)
    #[arg(long, env = "LOG_ANOMALY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on normal records and write the model blob
    Train {
        /// Training records
        #[arg(long, short)]
        input: PathBuf,
        /// Input format
        #[arg(long, value_enum, default_value = "auto")]
        format: Format,
        /// Output model blob
        #[arg(long, short, default_value = "model.json")]
        model: PathBuf,
    },
    /// Score records with a saved model and print the JSON report
    Detect {
        /// Model blob produced by `train`
        #[arg(long, short)]
        model: PathBuf,
        /// Records to score
        #[arg(long, short)]
        input: PathBuf,
        /// Input format
        #[arg(long, value_enum, default_value = "auto")]
        format: Format,
        /// Only include anomalous verdicts in the report
        #[arg(long)]
        anomalies_only: bool,
    },
    /// Train and detect in one run
    Analyze {
        /// Training records
        #[arg(long)]
        train: PathBuf,
        /// Records to score (defaults to the training records)
        #[arg(long, short)]
        input: Option<PathBuf>,
        /// Input format
        #[arg(long, value_enum, default_value = "auto")]
        format: Format,
        /// Only include anomalous verdicts in the report
        #[arg(long)]
        anomalies_only: bool,
    },
    /// Print a sample configuration file
    SampleConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Auto,
    Json,
    Jsonl,
    Lines,
}

impl From<Format> for InputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Auto => InputFormat::Auto,
            Format::Json => InputFormat::Json,
            Format::Jsonl => InputFormat::JsonLines,
            Format::Lines => InputFormat::Lines,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::SampleConfig = cli.command {
        print!("{}", generate_sample_config()?);
        return Ok(());
    }

    let config = ConfigLoader::new()
        .load_from_file(cli.config.as_deref())
        .load_from_env()
        .build()?;

    let mut log_config = LogConfig::from_settings(&config.logging);
    if let Some(level) = cli.log_level {
        log_config = log_config.with_level(level);
    }
    let _guard = init_logging(&log_config)?;

    let engine = AnomalyEngine::new(config.engine).context("Invalid engine configuration")?;
    let service = DetectionService::new(engine)
        .with_store(Arc::new(InMemoryVerdictStore::new()))
        .with_notifier(Arc::new(TracingNotifier));

    match cli.command {
        Commands::Train {
            input,
            format,
            model,
        } => {
            let records = load(&input, format)?;
            let summary = service.train(records).await?;
            let blob = service.export_model().await?;
            std::fs::write(&model, blob)
                .with_context(|| format!("Failed to write model to {}", model.display()))?;
            info!("Model written to {}", model.display());
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Detect {
            model,
            input,
            format,
            anomalies_only,
        } => {
            let blob = std::fs::read_to_string(&model)
                .with_context(|| format!("Failed to read model from {}", model.display()))?;
            service.import_model(blob).await?;
            let records = load(&input, format)?;
            print_report(&service, records, anomalies_only).await?;
        }
        Commands::Analyze {
            train,
            input,
            format,
            anomalies_only,
        } => {
            let training = load(&train, format)?;
            let records = match input {
                Some(path) => load(&path, format)?,
                None => training.clone(),
            };
            service.train(training).await?;
            print_report(&service, records, anomalies_only).await?;
        }
        Commands::SampleConfig => {}
    }

    Ok(())
}

fn load(path: &Path, format: Format) -> Result<Vec<LogRecord>> {
    let records = read_records(path, format.into())
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

async fn print_report(
    service: &DetectionService,
    records: Vec<LogRecord>,
    anomalies_only: bool,
) -> Result<()> {
    let mut report = service.detect(records).await?;
    if anomalies_only {
        report.verdicts.retain(|v| v.is_anomaly);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
