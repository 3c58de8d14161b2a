//! cpu-anomaly: reconstruction-error anomaly detection for CPU metrics
//!
//! A small LSTM autoencoder learns to reconstruct known-normal values of a
//! univariate series. Points whose reconstruction error rises more than
//! `multiplier` standard deviations above the training error mean are
//! flagged.
//!
//! ## Architecture
//!
//! - **Scaler**: per-feature standard scores (Welford, population σ)
//! - **Model**: LSTM cell + tanh dense head, manual forward/backward
//! - **Trainer**: fixed-order SGD epochs with per-epoch train/validation MSE
//! - **Evaluator**: one reconstruction error per sample, optionally on rayon
//! - **Threshold**: mean + kσ over training errors, strict `>` classification
//! - **Evaluation**: confusion matrix and F1 against ground truth
//! - **Pipeline**: wires the above end to end
//! - **Dataset**: NAB CSV + `combined_labels.json` loading

pub mod batching;
pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod evaluator;
pub mod model;
pub mod pipeline;
pub mod scaler;
pub mod threshold;
pub mod trainer;

pub use batching::{split_train_validation, Batch, BatchLoader};
pub use config::{ConfigError, DetectorConfig};
pub use context::{ExecutionTarget, RunContext};
pub use dataset::{DatasetError, NabDataset, NabLabels, Series, SeriesPoint};
pub use error::{DetectorError, Result, Stage};
pub use evaluation::{f1, ConfusionMatrix};
pub use evaluator::compute_errors;
pub use model::{ModelParameters, RecurrentMode, SequenceModel};
pub use pipeline::{AnomalyPipeline, Detection, DetectionReport, FittedDetector, TestNormalization};
pub use scaler::{ScalerState, StandardScaler};
pub use threshold::{classify, derive_threshold, Threshold};
pub use trainer::{Trainer, TrainingHistory};
