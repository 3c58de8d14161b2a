//! Error taxonomy for the detection core.
//!
//! Every variant names the pipeline stage that failed together with the
//! offending shape or statistic, so a failed run can be diagnosed from the
//! error message alone.

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, DetectorError>;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scaler,
    Batching,
    Model,
    Trainer,
    Evaluator,
    Threshold,
    Evaluation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Scaler => write!(f, "scaler"),
            Stage::Batching => write!(f, "batching"),
            Stage::Model => write!(f, "model"),
            Stage::Trainer => write!(f, "trainer"),
            Stage::Evaluator => write!(f, "evaluator"),
            Stage::Threshold => write!(f, "threshold"),
            Stage::Evaluation => write!(f, "evaluation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("{stage}: scaler used before fit()")]
    NotFitted { stage: Stage },

    #[error("scaler: feature {feature} has degenerate statistics (mean={mean}, std={std})")]
    DegenerateFeature { feature: usize, mean: f64, std: f64 },

    #[error("{stage}: non-finite value {value} at sample {sample}")]
    NonFinite { stage: Stage, sample: usize, value: f64 },

    #[error("{stage}: shape mismatch, expected {expected}, got {actual}")]
    ShapeMismatch {
        stage: Stage,
        expected: String,
        actual: String,
    },

    #[error("{stage}: empty input ({detail})")]
    EmptyInput { stage: Stage, detail: String },

    #[error("trainer: numerical divergence at epoch {epoch}, batch {batch} (loss={loss})")]
    NumericalDivergence { epoch: usize, batch: usize, loss: f64 },

    #[error("trainer: cancelled during epoch {epoch}")]
    Cancelled { epoch: usize },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl DetectorError {
    pub(crate) fn empty(stage: Stage, detail: impl Into<String>) -> Self {
        Self::EmptyInput {
            stage,
            detail: detail.into(),
        }
    }

    pub(crate) fn shape(
        stage: Stage,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ShapeMismatch {
            stage,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Stage that raised this error, if it belongs to the core pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::NotFitted { stage }
            | Self::NonFinite { stage, .. }
            | Self::ShapeMismatch { stage, .. }
            | Self::EmptyInput { stage, .. } => Some(*stage),
            Self::DegenerateFeature { .. } => Some(Stage::Scaler),
            Self::NumericalDivergence { .. } | Self::Cancelled { .. } => Some(Stage::Trainer),
            Self::Config(_) => None,
        }
    }
}
