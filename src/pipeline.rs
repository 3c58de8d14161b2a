//! End-to-end detection pipeline.
//!
//! ```text
//! reference ─ fit scaler ─ split ─ train model ─ errors on reference ─ threshold
//!                                                                          │
//! test ─ scale (per TestNormalization) ─ errors on test ─ classify ────────┘
//! ```
//!
//! [`AnomalyPipeline::fit`] produces a [`FittedDetector`]; [`FittedDetector::detect`]
//! labels new series. [`AnomalyPipeline::run`] does both and scores the result
//! against ground truth.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::batching::{split_train_validation, BatchLoader};
use crate::config::DetectorConfig;
use crate::context::RunContext;
use crate::error::Result;
use crate::evaluation::ConfusionMatrix;
use crate::evaluator::compute_errors;
use crate::model::SequenceModel;
use crate::scaler::{ScalerState, StandardScaler};
use crate::threshold::{classify, derive_threshold, Threshold};
use crate::trainer::{Trainer, TrainingHistory};

/// How the test series is scaled before scoring.
///
/// `Refit` fits fresh statistics on the test series itself, so a test set
/// with a different level than the reference is centred independently.
/// This is the default and is kept on purpose; `ReuseTraining` applies the
/// reference statistics instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestNormalization {
    #[default]
    Refit,
    ReuseTraining,
}

impl std::fmt::Display for TestNormalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestNormalization::Refit => write!(f, "refit"),
            TestNormalization::ReuseTraining => write!(f, "reuse_training"),
        }
    }
}

/// Errors and labels for one scored series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub errors: Vec<f64>,
    pub labels: Vec<u8>,
}

impl Detection {
    pub fn anomaly_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l != 0).count()
    }

    /// Indices of flagged samples.
    pub fn anomaly_indices(&self) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(i, &l)| (l != 0).then_some(i))
            .collect()
    }
}

/// Summary of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub predicted: Vec<u8>,
    pub test_errors: Vec<f64>,
    pub threshold: Threshold,
    pub confusion: ConfusionMatrix,
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
    pub history: TrainingHistory,
    pub test_normalization: TestNormalization,
    pub parameter_version: u64,
}

/// A trained model together with its scaler and threshold.
#[derive(Debug, Clone)]
pub struct FittedDetector {
    scaler: ScalerState,
    model: SequenceModel,
    threshold: Threshold,
    history: TrainingHistory,
    test_policy: TestNormalization,
    batch_size: usize,
}

impl FittedDetector {
    /// Reconstruction error of every sample of `values`.
    pub fn score(&self, ctx: &RunContext, values: &[f64]) -> Result<Vec<f64>> {
        let feature_count = self.model.feature_count();
        let scaled = match self.test_policy {
            TestNormalization::Refit => StandardScaler::new(feature_count).fit_transform(values)?,
            TestNormalization::ReuseTraining => self.scaler.apply(values)?,
        };
        let loader = BatchLoader::new(scaled, feature_count, self.batch_size)?;
        compute_errors(ctx, &self.model, &loader)
    }

    /// Score and classify a series.
    pub fn detect(&self, ctx: &RunContext, values: &[f64]) -> Result<Detection> {
        let errors = self.score(ctx, values)?;
        let labels = classify(&errors, &self.threshold);
        Ok(Detection { errors, labels })
    }

    pub fn threshold(&self) -> &Threshold {
        &self.threshold
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn scaler(&self) -> &ScalerState {
        &self.scaler
    }

    pub fn model(&self) -> &SequenceModel {
        &self.model
    }

    pub fn test_policy(&self) -> TestNormalization {
        self.test_policy
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyPipeline {
    config: DetectorConfig,
}

impl AnomalyPipeline {
    /// Validate the config and build a pipeline around it.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Fit scaler, model and threshold on a known-normal reference series.
    pub fn fit(&self, ctx: &RunContext, reference: &[f64]) -> Result<FittedDetector> {
        let cfg = &self.config;
        let feature_count = cfg.model.feature_count;
        let batch_size = cfg.training.batch_size;

        let scaler = ScalerState::fit(reference, feature_count)?;
        let scaled = scaler.apply(reference)?;

        let (train, validation) =
            split_train_validation(&scaled, feature_count, cfg.training.split_fraction)?;
        let train_loader = BatchLoader::new(train, feature_count, batch_size)?;
        let validation_loader = BatchLoader::new(validation, feature_count, batch_size)?;

        info!(
            reference = scaler.count(),
            training = train_loader.num_samples(),
            validation = validation_loader.num_samples(),
            mode = ?cfg.model.recurrent_mode,
            target = %ctx.target(),
            seed = ctx.seed(),
            "Fitting detector"
        );

        let mut model = SequenceModel::from_config(ctx, &cfg.model);
        let history = Trainer::from_config(&cfg.training).train(
            ctx,
            &mut model,
            &train_loader,
            &validation_loader,
        )?;

        let reference_loader = BatchLoader::new(scaled, feature_count, batch_size)?;
        let reference_errors = compute_errors(ctx, &model, &reference_loader)?;
        let threshold = derive_threshold(&reference_errors, cfg.threshold.multiplier)?;

        Ok(FittedDetector {
            scaler,
            model,
            threshold,
            history,
            test_policy: cfg.normalization.test_policy,
            batch_size,
        })
    }

    /// Fit on `reference`, label `test` and score the labels against `ground_truth`.
    pub fn run(
        &self,
        ctx: &RunContext,
        reference: &[f64],
        test: &[f64],
        ground_truth: &[u8],
    ) -> Result<DetectionReport> {
        let detector = self.fit(ctx, reference)?;
        let detection = detector.detect(ctx, test)?;
        let confusion = ConfusionMatrix::from_labels(ground_truth, &detection.labels)?;

        if confusion.true_positives + confusion.false_negatives == 0 {
            warn!("Ground truth has no anomalies; F1 only reflects false alarms");
        }
        info!(
            flagged = detection.anomaly_count(),
            samples = detection.labels.len(),
            f1 = confusion.f1(),
            precision = confusion.precision(),
            recall = confusion.recall(),
            "Detection complete"
        );

        Ok(DetectionReport {
            f1: confusion.f1(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            predicted: detection.labels,
            test_errors: detection.errors,
            threshold: detector.threshold,
            confusion,
            parameter_version: detector.model.parameters().version(),
            history: detector.history,
            test_normalization: detector.test_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DetectorError, Stage};

    fn reference() -> Vec<f64> {
        (0..10).map(|i| if i % 2 == 0 { 9.9 } else { 10.1 }).collect()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = DetectorConfig::default();
        config.training.epochs = 0;
        assert!(matches!(AnomalyPipeline::new(config), Err(DetectorError::Config(_))));
    }

    #[test]
    fn test_fit_records_history_per_epoch() {
        let pipeline = AnomalyPipeline::new(DetectorConfig::default()).unwrap();
        let detector = pipeline.fit(&RunContext::default(), &reference()).unwrap();
        assert_eq!(detector.history().epochs(), 15);
        assert_eq!(detector.history().validation_mse.len(), 15);
        assert_eq!(detector.model().parameters().version(), 15);
        assert!(detector.threshold().value.is_finite());
    }

    #[test]
    fn test_policies_scale_differently() {
        let mut config = DetectorConfig::default();
        config.training.epochs = 2;
        let refit = AnomalyPipeline::new(config.clone()).unwrap();
        config.normalization.test_policy = TestNormalization::ReuseTraining;
        let reuse = AnomalyPipeline::new(config).unwrap();

        let ctx = RunContext::default();
        let shifted: Vec<f64> = reference().iter().map(|v| v + 50.0).collect();
        let a = refit.fit(&ctx, &reference()).unwrap().score(&ctx, &shifted).unwrap();
        let b = reuse.fit(&ctx, &reference()).unwrap().score(&ctx, &shifted).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_constant_test_series_under_refit_is_degenerate() {
        let pipeline = AnomalyPipeline::new(DetectorConfig::default()).unwrap();
        let ctx = RunContext::default();
        let detector = pipeline.fit(&ctx, &reference()).unwrap();
        let err = detector.detect(&ctx, &[5.0; 6]).unwrap_err();
        assert!(matches!(err, DetectorError::DegenerateFeature { .. }));
    }

    #[test]
    fn test_nan_test_sample_fails_under_both_policies() {
        let mut test = vec![10.0, 10.2, 9.8, 10.0, 10.1, 9.9];
        test[3] = f64::NAN;
        let ctx = RunContext::default();
        for policy in [TestNormalization::Refit, TestNormalization::ReuseTraining] {
            let mut config = DetectorConfig::default();
            config.training.epochs = 2;
            config.normalization.test_policy = policy;
            let detector = AnomalyPipeline::new(config).unwrap().fit(&ctx, &reference()).unwrap();
            let err = detector.detect(&ctx, &test).unwrap_err();
            assert!(
                matches!(err, DetectorError::NonFinite { stage: Stage::Scaler, sample: 3, .. }),
                "{policy}: {err}"
            );
        }
    }

    #[test]
    fn test_infinite_reference_sample_fails_fit() {
        let mut reference = reference();
        reference[4] = f64::INFINITY;
        let pipeline = AnomalyPipeline::new(DetectorConfig::default()).unwrap();
        let err = pipeline.fit(&RunContext::default(), &reference).unwrap_err();
        assert!(matches!(err, DetectorError::NonFinite { sample: 4, .. }));
    }

    #[test]
    fn test_detection_indices() {
        let d = Detection {
            errors: vec![0.1, 9.0, 0.2, 8.0],
            labels: vec![0, 1, 0, 1],
        };
        assert_eq!(d.anomaly_count(), 2);
        assert_eq!(d.anomaly_indices(), vec![1, 3]);
    }
}
