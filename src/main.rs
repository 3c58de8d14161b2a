//! cpu-anomaly - LSTM reconstruction-error anomaly detector
//!
//! Trains on a NAB reference series (anomalies forward-filled), labels a
//! test series and scores the labels with F1.
//!
//! # Usage
//!
//! ```bash
//! # Generate a synthetic NAB-layout dataset and run on it
//! cargo run --release --bin simulation -- --out ./dataset/nab
//! cargo run --release -- --data-dir ./dataset/nab --output report.json
//!
//! # Against a real NAB checkout with a custom config
//! DETECTOR_CONFIG=./detector.toml ./cpu-anomaly --data-dir ~/NAB
//! ```
//!
//! # Environment Variables
//!
//! - `DETECTOR_CONFIG`: Path to a TOML config (default: `./detector.toml`)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cpu_anomaly::dataset::{self, NabDataset, NabLabels};
use cpu_anomaly::{
    AnomalyPipeline, DetectionReport, DetectorConfig, ExecutionTarget, RunContext,
    TestNormalization,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "cpu-anomaly")]
#[command(about = "LSTM reconstruction-error anomaly detection for CPU utilization metrics")]
#[command(version)]
struct CliArgs {
    /// NAB root containing `data/` and `labels/`
    #[arg(long, default_value = "./dataset/nab", env = "NAB_DATA_DIR")]
    data_dir: PathBuf,

    /// Reference series, relative to `<data-dir>/data`
    #[arg(long, default_value = dataset::DEFAULT_TRAINING_FILE)]
    train: String,

    /// Test series, relative to `<data-dir>/data`
    #[arg(long, default_value = dataset::DEFAULT_TEST_FILE)]
    test: String,

    /// Label file (default: `<data-dir>/labels/combined_labels.json`)
    #[arg(long)]
    labels: Option<PathBuf>,

    /// TOML config file (overrides `DETECTOR_CONFIG` and `./detector.toml`)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Score inference batches on the rayon pool
    #[arg(long)]
    parallel: bool,

    /// Scale the test series with the reference statistics instead of refitting
    #[arg(long)]
    reuse_training_stats: bool,

    /// Write the JSON report here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the effective config here and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

impl CliArgs {
    /// Apply flag overrides on top of the file/default config.
    fn apply_overrides(&self, config: &mut DetectorConfig) {
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            config.training.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            config.runtime.seed = seed;
        }
        if self.parallel {
            config.runtime.execution = ExecutionTarget::CpuParallel;
        }
        if self.reuse_training_stats {
            config.normalization.test_policy = TestNormalization::ReuseTraining;
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => DetectorConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DetectorConfig::load(),
    };
    args.apply_overrides(&mut config);
    config.validate().context("invalid configuration after CLI overrides")?;

    if let Some(path) = &args.dump_config {
        config
            .save_to_file(path)
            .with_context(|| format!("writing config {}", path.display()))?;
        info!(path = %path.display(), "Wrote effective config");
        return Ok(());
    }

    let nab = match &args.labels {
        Some(path) => {
            let labels = NabLabels::load(path)
                .with_context(|| format!("loading labels {}", path.display()))?;
            NabDataset::with_labels(&args.data_dir, labels)
        }
        None => NabDataset::open(&args.data_dir)
            .with_context(|| format!("opening NAB dataset at {}", args.data_dir.display()))?,
    };

    let training = nab
        .load_series(&args.train)
        .with_context(|| format!("loading training series {}", args.train))?;
    let test = nab
        .load_series(&args.test)
        .with_context(|| format!("loading test series {}", args.test))?;

    let reference = training
        .values_without_anomalies()
        .context("removing labelled anomalies from the training series")?;
    let test_values = test.values();
    let ground_truth = test.labels();

    info!(
        training = training.len(),
        training_anomalies = training.anomaly_count(),
        test = test.len(),
        test_anomalies = test.anomaly_count(),
        "Datasets loaded"
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("Received Ctrl+C, cancelling training...");
        shutdown_token.cancel();
    });

    let ctx = RunContext::from_config(&config).with_cancellation(cancel_token);
    let pipeline = AnomalyPipeline::new(config).context("building pipeline")?;

    let report: DetectionReport = tokio::task::spawn_blocking(move || {
        pipeline.run(&ctx, &reference, &test_values, &ground_truth)
    })
    .await
    .context("pipeline task panicked")?
    .context("anomaly detection failed")?;

    print_summary(&report, &test);

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&report).context("serializing report")?;
        std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    Ok(())
}

fn print_summary(report: &DetectionReport, test: &cpu_anomaly::Series) {
    let flagged: Vec<String> = report
        .predicted
        .iter()
        .zip(&test.points)
        .filter(|&(&label, _)| label != 0)
        .map(|(_, p)| p.timestamp.to_string())
        .collect();

    println!("Series:     {}", test.name);
    println!(
        "Threshold:  {:.6} (mean {:.6} + {} x std {:.6})",
        report.threshold.value,
        report.threshold.mean,
        report.threshold.multiplier,
        report.threshold.std
    );
    println!("Flagged:    {} of {}", flagged.len(), report.predicted.len());
    for ts in &flagged {
        println!("  - {ts}");
    }
    println!("Precision:  {:.4}", report.precision);
    println!("Recall:     {:.4}", report.recall);
    println!("F1:         {:.4}", report.f1);
    if let (Some(t), Some(v)) = (
        report.history.final_training_mse(),
        report.history.final_validation_mse(),
    ) {
        println!("Final MSE:  train {t:.6} / validation {v:.6}");
    }
}
