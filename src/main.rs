//! Network Attack Detector - Command-line entry point
//!
//! Reads an uploaded traffic file, classifies every record and exports the
//! results as CSV.

use anyhow::{Context, Result};
use attack_detector::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    detector::Detector,
    input::read_table,
    models::load_artifacts,
    report::{self, DetectionSummary},
};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "attack-detector")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Detect network attacks in traffic records with a pre-trained model", long_about = None)]
struct Args {
    /// Traffic file to analyse (.csv, .xlsx or .xls, header row first)
    #[arg(short, long)]
    input: PathBuf,

    /// Write results to this CSV file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only export records classified as attacks
    #[arg(long)]
    attacks_only: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(config: &AppConfig, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("attack_detector={}", level).parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load_from_path(&args.config)?;
    init_logging(&config, args.verbose)?;

    info!("Starting Network Attack Detector");
    info!(config = %args.config.display(), "Configuration loaded");

    let artifacts = load_artifacts(&config.artifacts.paths(), config.artifacts.onnx_threads)
        .map_err(|e| {
            error!(error = %e, "Failed to load model artifacts");
            e
        })
        .context("Model artifacts are unavailable; check the configured paths")?;
    let detector = Detector::new(artifacts);

    let table = read_table(&args.input)?;
    let results = match detector.detect(&table) {
        Ok(results) => results,
        Err(e) => {
            warn!(input = %args.input.display(), error = %e, "Upload rejected");
            return Err(e.into());
        }
    };

    let summary = DetectionSummary::from_results(&results);
    info!(
        total = summary.total,
        attacks = summary.attacks,
        attack_percentage = format!("{:.2}%", summary.attack_percentage),
        "Detection complete"
    );
    eprintln!(
        "Total records: {}  Attacks detected: {}  Attack share: {:.2}%",
        summary.total, summary.attacks, summary.attack_percentage
    );

    let exported = if args.attacks_only || config.output.attacks_only {
        report::attacks_only(&results)
    } else {
        results
    };

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            report::write_csv(&exported, BufWriter::new(file))?;
            info!(path = %path.display(), rows = exported.len(), "Results written");
        }
        None => report::write_csv(&exported, io::stdout().lock())?,
    }

    Ok(())
}
