//! Sequence model: ties parameters to a recurrent mode and exposes the
//! batch-level forward pass.

use serde::{Deserialize, Serialize};

use crate::batching::Batch;
use crate::config::ModelConfig;
use crate::context::RunContext;
use crate::error::{DetectorError, Result, Stage};
use crate::model::lstm::{LstmCell, StepCache};
use crate::model::params::ModelParameters;

/// How samples of a batch pass through the recurrent layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrentMode {
    /// Every sample is its own single-step sequence.
    #[default]
    Independent,
    /// The batch is one time-major sequence. State is carried from sample
    /// to sample and dropped at the end of the batch.
    BatchSequence,
}

#[derive(Debug, Clone)]
pub struct SequenceModel {
    params: ModelParameters,
    mode: RecurrentMode,
}

impl SequenceModel {
    /// Fresh model with Xavier-initialised parameters seeded from the context.
    pub fn new(ctx: &RunContext, feature_count: usize, mode: RecurrentMode) -> Self {
        Self {
            params: ModelParameters::xavier(feature_count, feature_count, ctx.seed()),
            mode,
        }
    }

    pub fn from_config(ctx: &RunContext, config: &ModelConfig) -> Self {
        Self::new(ctx, config.feature_count, config.recurrent_mode)
    }

    /// Reconstruct a batch. Output has the batch's shape, row-major.
    pub fn forward(&self, batch: &Batch<'_>) -> Result<Vec<f64>> {
        let caches = self.forward_cached(batch)?;
        Ok(caches
            .into_iter()
            .flatten()
            .flat_map(|step| step.y)
            .collect())
    }

    /// Forward pass keeping per-step caches, grouped by recurrent sequence.
    pub(crate) fn forward_cached(&self, batch: &Batch<'_>) -> Result<Vec<Vec<StepCache>>> {
        self.check_batch(batch)?;
        Ok(match self.mode {
            RecurrentMode::Independent => batch
                .samples()
                .map(|x| LstmCell::forward_sequence(&self.params, std::iter::once(x)))
                .collect(),
            RecurrentMode::BatchSequence => {
                if batch.is_empty() {
                    Vec::new()
                } else {
                    vec![LstmCell::forward_sequence(&self.params, batch.samples())]
                }
            }
        })
    }

    fn check_batch(&self, batch: &Batch<'_>) -> Result<()> {
        let expected = self.feature_count();
        if batch.feature_count() != expected {
            let (n, t, f) = batch.shape();
            return Err(DetectorError::shape(
                Stage::Model,
                format!("(n, 1, {expected})"),
                format!("({n}, {t}, {f})"),
            ));
        }
        Ok(())
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut ModelParameters {
        &mut self.params
    }

    pub fn feature_count(&self) -> usize {
        self.params.input_size()
    }

    pub fn mode(&self) -> RecurrentMode {
        self.mode
    }
}
