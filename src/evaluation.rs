//! Binary classification metrics against ground-truth labels.

use serde::Serialize;

use crate::error::{DetectorError, Result, Stage};

/// Counts of a binary classification, positive class = 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    /// Tally predictions against ground truth. Any non-zero label is positive.
    pub fn from_labels(ground_truth: &[u8], predicted: &[u8]) -> Result<Self> {
        if ground_truth.is_empty() || predicted.is_empty() {
            return Err(DetectorError::empty(Stage::Evaluation, "no labels to compare"));
        }
        if ground_truth.len() != predicted.len() {
            return Err(DetectorError::empty(
                Stage::Evaluation,
                format!(
                    "length mismatch: {} ground-truth vs {} predicted",
                    ground_truth.len(),
                    predicted.len()
                ),
            ));
        }

        let mut m = Self::default();
        for (&t, &p) in ground_truth.iter().zip(predicted) {
            match (t != 0, p != 0) {
                (true, true) => m.true_positives += 1,
                (false, true) => m.false_positives += 1,
                (false, false) => m.true_negatives += 1,
                (true, false) => m.false_negatives += 1,
            }
        }
        Ok(m)
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// Harmonic mean of precision and recall.
    ///
    /// With no positives in either sequence every prediction is a true
    /// negative, which scores 1.0.
    pub fn f1(&self) -> f64 {
        if self.true_positives + self.false_positives + self.false_negatives == 0 {
            return 1.0;
        }
        let denom = 2 * self.true_positives + self.false_positives + self.false_negatives;
        ratio(2 * self.true_positives, denom)
    }
}

/// F1 score of `predicted` against `ground_truth`.
pub fn f1(ground_truth: &[u8], predicted: &[u8]) -> Result<f64> {
    Ok(ConfusionMatrix::from_labels(ground_truth, predicted)?.f1())
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_correct() {
        assert_eq!(f1(&[0, 1, 0, 1], &[0, 1, 0, 1]).unwrap(), 1.0);
    }

    #[test]
    fn test_all_wrong() {
        assert_eq!(f1(&[0, 1, 0, 1], &[1, 0, 1, 0]).unwrap(), 0.0);
    }

    #[test]
    fn test_no_positives_anywhere() {
        assert_eq!(f1(&[0, 0, 0], &[0, 0, 0]).unwrap(), 1.0);
    }

    #[test]
    fn test_partial() {
        let m = ConfusionMatrix::from_labels(&[1, 1, 0, 0], &[1, 0, 1, 0]).unwrap();
        assert_eq!(m.true_positives, 1);
        assert_eq!(m.false_positives, 1);
        assert_eq!(m.false_negatives, 1);
        assert_eq!(m.true_negatives, 1);
        assert!((m.precision() - 0.5).abs() < 1e-12);
        assert!((m.recall() - 0.5).abs() < 1e-12);
        assert!((m.f1() - 0.5).abs() < 1e-12);
        assert!((m.accuracy() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_false_alarms_only() {
        let m = ConfusionMatrix::from_labels(&[0, 0], &[1, 0]).unwrap();
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.recall(), 0.0);
        assert_eq!(m.f1(), 0.0);
    }

    #[test]
    fn test_empty_and_mismatch_rejected() {
        assert!(matches!(
            f1(&[], &[]).unwrap_err(),
            DetectorError::EmptyInput { stage: Stage::Evaluation, .. }
        ));
        assert!(matches!(
            f1(&[0, 1], &[0]).unwrap_err(),
            DetectorError::EmptyInput { stage: Stage::Evaluation, .. }
        ));
    }
}
