//! machine-health CLI
//!
//! ## Commands
//!
//! - `train`: fit the anomaly model on a CSV of readings or on generated sample data
//! - `analyze`: print health verdicts (JSON) for the readings in a CSV
//! - `ingest`: decode a vendor JSON payload into CSV readings, reporting threshold breaches
//! - `generate`: write synthetic readings as CSV
//! - `model-info`: show the persisted model
//!
//! ## Environment Variables
//!
//! - `MACHINE_HEALTH_CONFIG`: path to the TOML config (default: ./machine_health.toml)
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use machine_health::config::{self, defaults, AnalyticsConfig};
use machine_health::simulation::SyntheticGenerator;
use machine_health::{
    acquisition, build_aggregator, sensors, FeatureBuilder, Reading, ThresholdEvaluator, Vendor,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "machine-health")]
#[command(about = "Industrial sensor analytics: thresholds, anomalies and failure trends")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides the default search order)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Train the anomaly model and persist it
    Train {
        /// CSV of readings (timestamp,machine_id,sensor_id,sensor_type,value)
        #[arg(long, conflicts_with = "samples")]
        csv: Option<PathBuf>,
        /// Generate this many synthetic timesteps instead of reading a CSV
        #[arg(long)]
        samples: Option<usize>,
        /// Only train on readings from this machine
        #[arg(long)]
        machine_id: Option<String>,
    },

    /// Analyze readings and print verdicts as JSON
    Analyze {
        #[arg(long)]
        csv: PathBuf,
        /// Analyze a single machine instead of every machine in the file
        #[arg(long)]
        machine_id: Option<String>,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Decode a vendor payload (file or stdin) into CSV readings on stdout
    Ingest {
        #[arg(long, value_enum)]
        vendor: VendorArg,
        /// Payload file; reads stdin when omitted
        #[arg(long)]
        payload: Option<PathBuf>,
    },

    /// Write synthetic readings as CSV
    Generate {
        #[arg(long, default_value_t = defaults::SYNTHETIC_DEFAULT_SAMPLES)]
        samples: usize,
        #[arg(long, default_value = "machine-1")]
        machine_id: String,
        #[arg(long, default_value_t = defaults::DEFAULT_SEED)]
        seed: u64,
        /// Output file; writes stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show the persisted model
    ModelInfo,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum VendorArg {
    Siemens,
    Schneider,
    Generic,
}

impl From<VendorArg> for Vendor {
    fn from(v: VendorArg) -> Self {
        match v {
            VendorArg::Siemens => Vendor::Siemens,
            VendorArg::Schneider => Vendor::Schneider,
            VendorArg::Generic => Vendor::Generic,
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn run_train(
    cfg: &AnalyticsConfig,
    csv: Option<PathBuf>,
    samples: Option<usize>,
    machine_id: Option<String>,
) -> Result<()> {
    let mut readings = match csv {
        Some(path) => sensors::read_csv_data(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let samples = samples.unwrap_or(defaults::SYNTHETIC_DEFAULT_SAMPLES);
            let start = Utc::now() - Duration::days(30);
            SyntheticGenerator::new(cfg.model.seed).generate(
                machine_id.as_deref().unwrap_or("machine-1"),
                samples,
                start,
            )
        }
    };

    if let Some(id) = &machine_id {
        readings.retain(|r| &r.machine_id == id);
    }

    let aggregator = build_aggregator(cfg).context("Failed to open model store")?;
    let matrix = FeatureBuilder::new(cfg.features.rolling_window).build(&readings);
    let trained = aggregator
        .detector()
        .train(&matrix)
        .context("Training failed")?;

    println!("{}", serde_json::to_string_pretty(&trained)?);
    Ok(())
}

fn run_analyze(
    cfg: &AnalyticsConfig,
    csv: &Path,
    machine_id: Option<String>,
    pretty: bool,
) -> Result<()> {
    let readings = sensors::read_csv_data(csv)
        .with_context(|| format!("Failed to read {}", csv.display()))?;
    let aggregator = build_aggregator(cfg).context("Failed to open model store")?;

    let verdicts = match machine_id {
        Some(id) => {
            let own: Vec<Reading> = readings.into_iter().filter(|r| r.machine_id == id).collect();
            vec![aggregator.analyze(&id, &own)]
        }
        None => aggregator.analyze_fleet(&readings),
    };

    let out = if pretty {
        serde_json::to_string_pretty(&verdicts)?
    } else {
        serde_json::to_string(&verdicts)?
    };
    println!("{out}");
    Ok(())
}

fn run_ingest(cfg: &AnalyticsConfig, vendor: Vendor, payload: Option<PathBuf>) -> Result<()> {
    let body = match payload {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };

    let batch = acquisition::ingest(vendor, &body, Utc::now())
        .with_context(|| format!("Invalid {vendor} payload"))?;

    let evaluator = ThresholdEvaluator::new(Arc::new(cfg.thresholds.build_store()));
    for reading in &batch.readings {
        for violation in evaluator.evaluate_reading(reading) {
            warn!(
                machine_id = %violation.machine_id,
                severity = %violation.severity,
                "{}",
                violation.message
            );
        }
    }

    info!(
        machine_id = %batch.machine_id,
        readings = batch.readings.len(),
        skipped = batch.skipped,
        "Payload ingested"
    );
    sensors::write_csv(io::stdout().lock(), &batch.readings)?;
    Ok(())
}

fn run_generate(samples: usize, machine_id: &str, seed: u64, output: Option<PathBuf>) -> Result<()> {
    let start = Utc::now() - Duration::minutes(defaults::SYNTHETIC_INTERVAL_MINUTES * samples as i64);
    let readings = SyntheticGenerator::new(seed).generate(machine_id, samples, start);

    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            sensors::write_csv(io::BufWriter::new(file), &readings)?;
            info!(path = %path.display(), readings = readings.len(), "Synthetic data written");
        }
        None => sensors::write_csv(io::stdout().lock(), &readings)?,
    }
    Ok(())
}

fn run_model_info(cfg: &AnalyticsConfig) -> Result<()> {
    let aggregator = build_aggregator(cfg).context("Failed to open model store")?;
    match aggregator.detector().model_info() {
        Some(info) => println!("{}", serde_json::to_string_pretty(&info)?),
        None => bail!("No trained model in {}", cfg.model.path.display()),
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let cfg = match &args.config {
        Some(path) => AnalyticsConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalyticsConfig::load(),
    };
    config::init(cfg);
    let cfg = config::get();

    match args.command {
        SubCommand::Train {
            csv,
            samples,
            machine_id,
        } => run_train(cfg, csv, samples, machine_id),
        SubCommand::Analyze {
            csv,
            machine_id,
            pretty,
        } => run_analyze(cfg, &csv, machine_id, pretty),
        SubCommand::Ingest { vendor, payload } => run_ingest(cfg, vendor.into(), payload),
        SubCommand::Generate {
            samples,
            machine_id,
            seed,
            output,
        } => run_generate(samples, &machine_id, seed, output),
        SubCommand::ModelInfo => run_model_info(cfg),
    }
}
