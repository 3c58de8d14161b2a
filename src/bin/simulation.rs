//! Synthetic CPU Utilization Dataset
//!
//! Writes a NAB-layout dataset (two `rds_cpu_utilization` series plus
//! `labels/combined_labels.json`) so the detector can be exercised without
//! downloading NAB. Each series is a noisy daily cycle with a few injected
//! spikes; spike timestamps are recorded as labels.
//!
//! # Usage
//! ```bash
//! ./simulation --out ./dataset/nab --seed 7
//! ./cpu-anomaly --data-dir ./dataset/nab
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use tracing::info;

use cpu_anomaly::dataset::{self, NabLabels, Series, SeriesPoint};

// ============================================================================
// Signal Constants
// ============================================================================

/// NAB CloudWatch sampling interval (minutes)
const SAMPLE_MINUTES: i64 = 5;
/// Samples per day at the sampling interval
const SAMPLES_PER_DAY: f64 = 288.0;
/// Amplitude of the daily cycle (% CPU)
const DAILY_AMPLITUDE: f64 = 3.0;
/// Spike height above the local level (% CPU)
const SPIKE_HEIGHT: f64 = 45.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simulation")]
#[command(about = "Synthetic NAB-layout CPU utilization dataset generator")]
#[command(version)]
struct Args {
    /// Dataset root to write (`data/` and `labels/` are created under it)
    #[arg(short, long, default_value = "./dataset/nab")]
    out: PathBuf,

    /// Samples per series
    #[arg(
        short,
        long,
        default_value = "4032",
        value_parser = clap::value_parser!(u32).range(10..=100_000)
    )]
    points: u32,

    /// Mean CPU utilization (%)
    #[arg(long, default_value = "15.0")]
    base: f64,

    /// Standard deviation of the Gaussian noise (% CPU)
    #[arg(long, default_value = "0.8")]
    noise: f64,

    /// Spikes injected into the training series
    #[arg(long, default_value = "2")]
    train_spikes: usize,

    /// Spikes injected into the test series
    #[arg(long, default_value = "3")]
    test_spikes: usize,

    /// Random seed for reproducibility
    #[arg(long, default_value = "42")]
    seed: u64,
}

struct SeriesPlan<'a> {
    name: &'a str,
    start: NaiveDateTime,
    spikes: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let noise = Normal::new(0.0, args.noise).context("--noise must be finite and non-negative")?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    let start = NaiveDate::from_ymd_opt(2014, 2, 14)
        .and_then(|d| d.and_hms_opt(14, 30, 0))
        .context("invalid start timestamp")?;

    let plans = [
        SeriesPlan {
            name: dataset::DEFAULT_TRAINING_FILE,
            start,
            spikes: args.train_spikes,
        },
        SeriesPlan {
            name: dataset::DEFAULT_TEST_FILE,
            start: start + Duration::days(30),
            spikes: args.test_spikes,
        },
    ];

    let mut labels = NabLabels::default();
    for plan in &plans {
        let series = generate(&mut rng, &noise, &args, plan);
        let path = args.out.join(dataset::DATA_DIR).join(plan.name);
        series
            .write_csv(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        labels.insert(plan.name, &series.anomaly_timestamps());
        info!(
            path = %path.display(),
            points = series.len(),
            spikes = series.anomaly_count(),
            "Wrote series"
        );
    }

    let labels_path: &Path = &args.out.join(dataset::LABELS_FILE);
    labels
        .save(labels_path)
        .with_context(|| format!("writing {}", labels_path.display()))?;
    info!(path = %labels_path.display(), "Wrote labels");

    Ok(())
}

fn generate(rng: &mut StdRng, noise: &Normal<f64>, args: &Args, plan: &SeriesPlan<'_>) -> Series {
    let n = args.points as usize;
    let mut spike_at: Vec<usize> = (0..plan.spikes.min(n))
        .map(|_| rng.gen_range(n / 10..n))
        .collect();
    spike_at.sort_unstable();
    spike_at.dedup();

    let points = (0..n)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let phase = i as f64 / SAMPLES_PER_DAY * std::f64::consts::TAU;
            let mut value = args.base + DAILY_AMPLITUDE * phase.sin() + noise.sample(&mut *rng);
            let is_anomaly = spike_at.binary_search(&i).is_ok();
            if is_anomaly {
                value += SPIKE_HEIGHT;
            }
            #[allow(clippy::cast_possible_wrap)]
            let timestamp = plan.start + Duration::minutes(SAMPLE_MINUTES * i as i64);
            SeriesPoint {
                timestamp,
                value: (value.clamp(0.0, 100.0) * 1000.0).round() / 1000.0,
                is_anomaly,
            }
        })
        .collect();

    Series::new(plan.name, points)
}
