//! Statistical decision threshold over reconstruction errors.
//!
//! `threshold = mean + multiplier * sigma` of the errors the model makes on
//! known-normal (training) data. Any later error strictly above it is an
//! anomaly. Derived once per run and never updated.

use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::{info, warn};

use crate::error::{DetectorError, Result, Stage};

/// Default sigma multiplier.
pub const DEFAULT_MULTIPLIER: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Threshold {
    /// Mean training error.
    pub mean: f64,
    /// Population standard deviation of training errors.
    pub std: f64,
    pub multiplier: f64,
    /// `mean + multiplier * std`.
    pub value: f64,
}

impl Threshold {
    /// Whether a single error is flagged.
    #[inline]
    pub fn is_anomaly(&self, error: f64) -> bool {
        error > self.value
    }

    /// Z-score of an error against the training distribution.
    pub fn z_score(&self, error: f64) -> f64 {
        if self.std > 0.0 {
            (error - self.mean) / self.std
        } else {
            0.0
        }
    }
}

/// Derive the threshold from training-set reconstruction errors.
pub fn derive_threshold(training_errors: &[f64], multiplier: f64) -> Result<Threshold> {
    if training_errors.is_empty() {
        return Err(DetectorError::empty(Stage::Threshold, "no training errors"));
    }

    let mean = training_errors.iter().mean();
    let std = training_errors.iter().population_std_dev();
    let value = mean + multiplier * std;

    if std == 0.0 {
        warn!(mean, "Training errors have zero spread; threshold equals the mean");
    }
    info!(
        mean,
        std,
        multiplier,
        threshold = value,
        samples = training_errors.len(),
        "Threshold derived"
    );

    Ok(Threshold {
        mean,
        std,
        multiplier,
        value,
    })
}

/// Label each error: 1 iff strictly above the threshold.
pub fn classify(errors: &[f64], threshold: &Threshold) -> Vec<u8> {
    errors.iter().map(|&e| u8::from(threshold.is_anomaly(e))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_plus_sigma() {
        let t = derive_threshold(&[1.0, 2.0, 3.0, 4.0], 3.0).unwrap();
        let std = 1.25_f64.sqrt();
        assert!((t.mean - 2.5).abs() < 1e-12);
        assert!((t.std - std).abs() < 1e-12);
        assert!((t.value - (2.5 + 3.0 * std)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_errors_rejected() {
        let err = derive_threshold(&[], 3.0).unwrap_err();
        assert!(matches!(err, DetectorError::EmptyInput { stage: Stage::Threshold, .. }));
    }

    #[test]
    fn test_boundary_is_strict() {
        let t = derive_threshold(&[0.5, 0.5], 3.0).unwrap();
        assert_eq!(t.value, 0.5);
        let above = f64::from_bits(t.value.to_bits() + 1);
        assert_eq!(classify(&[0.5, above, 0.1], &t), vec![0, 1, 0]);
    }

    #[test]
    fn test_z_score() {
        let t = derive_threshold(&[1.0, 3.0], 2.0).unwrap();
        assert!((t.z_score(4.0) - 2.0).abs() < 1e-12);
        let flat = derive_threshold(&[1.0, 1.0], 2.0).unwrap();
        assert_eq!(flat.z_score(5.0), 0.0);
    }
}
