//! Manual backpropagation through the LSTM + dense head, and the SGD
//! epoch loop.
//!
//! The loss of one sample is the mean squared difference between its
//! reconstruction and itself. Per-sample gradients are summed over the
//! batch and the SGD step divides by the configured batch size, so a short
//! final batch takes a proportionally smaller step.
//!
//! In [`crate::model::RecurrentMode::BatchSequence`] gradients flow back through time
//! across the whole batch; in independent mode every sequence has one step
//! and BPTT degenerates to plain backprop.

use serde::Serialize;
use tracing::{debug, info};

use crate::batching::{Batch, BatchLoader};
use crate::config::TrainingConfig;
use crate::context::RunContext;
use crate::error::{DetectorError, Result, Stage};
use crate::model::lstm::{dot, StepCache};
use crate::model::params::ModelParameters;
use crate::model::SequenceModel;

/// Per-epoch reconstruction loss on the training and validation splits.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingHistory {
    pub training_mse: Vec<f64>,
    pub validation_mse: Vec<f64>,
}

impl TrainingHistory {
    pub fn epochs(&self) -> usize {
        self.training_mse.len()
    }

    pub fn final_training_mse(&self) -> Option<f64> {
        self.training_mse.last().copied()
    }

    pub fn final_validation_mse(&self) -> Option<f64> {
        self.validation_mse.last().copied()
    }
}

/// Plain SGD with gradient rescaling by `1 / batch_size`.
#[derive(Debug, Clone)]
pub struct SgdOptimizer {
    learning_rate: f64,
    rescale: f64,
    steps: u64,
}

impl SgdOptimizer {
    pub fn new(learning_rate: f64, batch_size: usize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let rescale = 1.0 / batch_size.max(1) as f64;
        Self {
            learning_rate,
            rescale,
            steps: 0,
        }
    }

    /// `w -= lr * rescale * grad` for every parameter.
    pub fn step(&mut self, params: &mut ModelParameters, grads: &ModelParameters) {
        let scale = self.learning_rate * self.rescale;
        for (w, g) in params.values_mut().zip(grads.values()) {
            *w -= scale * g;
        }
        params.bump_version();
        self.steps += 1;
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

/// Runs the fixed-length epoch schedule.
#[derive(Debug, Clone)]
pub struct Trainer {
    epochs: usize,
    learning_rate: f64,
    batch_size: usize,
}

impl Trainer {
    pub fn new(epochs: usize, learning_rate: f64, batch_size: usize) -> Self {
        Self {
            epochs,
            learning_rate,
            batch_size,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(config.epochs, config.learning_rate, config.batch_size)
    }

    /// Train `model` in place and return the per-epoch loss history.
    ///
    /// Batches are visited in loader order every epoch. After each epoch
    /// the loss over the full training and validation splits is recorded
    /// without updating parameters. A non-finite loss or parameter aborts
    /// the run with [`DetectorError::NumericalDivergence`].
    pub fn train(
        &self,
        ctx: &RunContext,
        model: &mut SequenceModel,
        training: &BatchLoader,
        validation: &BatchLoader,
    ) -> Result<TrainingHistory> {
        if training.is_empty() {
            return Err(DetectorError::empty(Stage::Trainer, "training split has no samples"));
        }
        if validation.is_empty() {
            return Err(DetectorError::empty(Stage::Trainer, "validation split has no samples"));
        }

        let mut optimizer = SgdOptimizer::new(self.learning_rate, self.batch_size);
        let mut history = TrainingHistory::default();

        info!(
            epochs = self.epochs,
            batches = training.num_batches(),
            samples = training.num_samples(),
            params = model.parameters().num_params(),
            "Training started"
        );

        for epoch in 0..self.epochs {
            for (batch_idx, batch) in training.iter().enumerate() {
                if ctx.is_cancelled() {
                    return Err(DetectorError::Cancelled { epoch: epoch + 1 });
                }

                let loss = train_step(model, &batch, &mut optimizer)?;
                if !loss.is_finite() || !model.parameters().is_finite() {
                    return Err(DetectorError::NumericalDivergence {
                        epoch: epoch + 1,
                        batch: batch_idx,
                        loss,
                    });
                }
                debug!(epoch = epoch + 1, batch = batch_idx, loss, "Batch trained");
            }

            let training_mse = evaluate_loss(model, training)?;
            let validation_mse = evaluate_loss(model, validation)?;
            info!(epoch = epoch + 1, training_mse, validation_mse, "Epoch complete");

            history.training_mse.push(training_mse);
            history.validation_mse.push(validation_mse);
        }

        Ok(history)
    }
}

/// Forward, backprop and one SGD step on a single batch.
///
/// Returns the batch's mean per-sample loss measured before the update.
pub fn train_step(
    model: &mut SequenceModel,
    batch: &Batch<'_>,
    optimizer: &mut SgdOptimizer,
) -> Result<f64> {
    let sequences = model.forward_cached(batch)?;
    if batch.is_empty() {
        return Ok(0.0);
    }

    let mut grads = ModelParameters::zeros_like(model.parameters());
    let mut loss_sum = 0.0;

    for steps in &sequences {
        loss_sum += backprop_sequence(model.parameters(), steps, &mut grads);
    }

    optimizer.step(model.parameters_mut(), &grads);

    #[allow(clippy::cast_precision_loss)]
    Ok(loss_sum / batch.len() as f64)
}

/// Mean of per-batch mean losses over a loader, no parameter updates.
pub fn evaluate_loss(model: &SequenceModel, loader: &BatchLoader) -> Result<f64> {
    let mut running = 0.0;
    let mut seen = 0usize;
    for batch in loader {
        let recon = model.forward(&batch)?;
        // Equal feature counts per sample, so the flat mean is the mean of
        // per-sample losses.
        let batch_mean = sample_loss(&recon, batch.as_slice());
        seen += 1;
        #[allow(clippy::cast_precision_loss)]
        {
            running += (batch_mean - running) / seen as f64;
        }
    }
    if seen == 0 {
        return Err(DetectorError::empty(Stage::Trainer, "no batches to evaluate"));
    }
    Ok(running)
}

/// Per-sample loss: mean over features of the squared difference.
pub fn sample_loss(reconstruction: &[f64], input: &[f64]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = input.len().max(1) as f64;
    reconstruction
        .iter()
        .zip(input)
        .map(|(y, x)| (y - x) * (y - x))
        .sum::<f64>()
        / n
}

/// BPTT over one recurrent sequence. Accumulates into `grads`, returns the
/// summed per-sample loss of the sequence.
fn backprop_sequence(
    params: &ModelParameters,
    steps: &[StepCache],
    grads: &mut ModelParameters,
) -> f64 {
    let n_in = params.input_size();
    let n_h = params.hidden_size();
    let mut dh_next = vec![0.0; n_h];
    let mut dc_next = vec![0.0; n_h];
    let mut loss = 0.0;

    #[allow(clippy::cast_precision_loss)]
    let inv_f = 1.0 / n_in as f64;

    for step in steps.iter().rev() {
        loss += sample_loss(&step.y, &step.x);

        // Dense head: y = tanh(W_d h + b_d)
        let mut dh = dh_next.clone();
        for o in 0..n_in {
            let dy = 2.0 * (step.y[o] - step.x[o]) * inv_f;
            let d_pre = dy * (1.0 - step.y[o] * step.y[o]);
            grads.dense.b[o] += d_pre;
            for k in 0..n_h {
                grads.dense.w[o * n_h + k] += d_pre * step.h[k];
                dh[k] += d_pre * params.dense.w[o * n_h + k];
            }
        }

        // Gates
        let mut dz = vec![0.0; 4 * n_h];
        for k in 0..n_h {
            let (i, f, g, o) = (step.i_gate[k], step.f_gate[k], step.g_gate[k], step.o_gate[k]);
            let tc = step.tanh_c[k];

            let d_o = dh[k] * tc;
            let dc = dh[k] * o * (1.0 - tc * tc) + dc_next[k];
            let d_i = dc * g;
            let d_g = dc * i;
            let d_f = dc * step.c_prev[k];
            dc_next[k] = dc * f;

            dz[k] = d_i * i * (1.0 - i);
            dz[n_h + k] = d_f * f * (1.0 - f);
            dz[2 * n_h + k] = d_g * (1.0 - g * g);
            dz[3 * n_h + k] = d_o * o * (1.0 - o);
        }

        let w = &params.lstm;
        for (r, &dzr) in dz.iter().enumerate() {
            grads.lstm.b[r] += dzr;
            for j in 0..n_in {
                grads.lstm.w_ih[r * n_in + j] += dzr * step.x[j];
            }
            for k in 0..n_h {
                grads.lstm.w_hh[r * n_h + k] += dzr * step.h_prev[k];
            }
        }

        // dL/dh_prev = W_hh^T dz
        for (k, dh_prev) in dh_next.iter_mut().enumerate() {
            let column: Vec<f64> = (0..4 * n_h).map(|r| w.w_hh[r * n_h + k]).collect();
            *dh_prev = dot(&column, &dz);
        }
    }

    loss
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::lstm::LstmCell;
    use crate::model::RecurrentMode;

    fn loss_of(params: &ModelParameters, xs: &[f64]) -> f64 {
        let caches = LstmCell::forward_sequence(params, xs.chunks_exact(params.input_size()));
        caches.iter().map(|c| sample_loss(&c.y, &c.x)).sum()
    }

    /// Finite-difference check of every gradient entry.
    fn check_gradients(input_size: usize, xs: &[f64]) {
        let params = ModelParameters::xavier(input_size, input_size, 17);
        let caches = LstmCell::forward_sequence(&params, xs.chunks_exact(input_size));
        let mut grads = ModelParameters::zeros_like(&params);
        backprop_sequence(&params, &caches, &mut grads);

        let analytic: Vec<f64> = grads.values().copied().collect();
        let eps = 1e-6;
        for (idx, &g) in analytic.iter().enumerate() {
            let mut plus = params.clone();
            let mut minus = params.clone();
            *plus.values_mut().nth(idx).unwrap() += eps;
            *minus.values_mut().nth(idx).unwrap() -= eps;
            let numeric = (loss_of(&plus, xs) - loss_of(&minus, xs)) / (2.0 * eps);
            assert!(
                (numeric - g).abs() < 1e-5 * (1.0 + numeric.abs()),
                "param {idx}: analytic {g} vs numeric {numeric}"
            );
        }
    }

    #[test]
    fn test_gradients_single_step() {
        check_gradients(1, &[0.8]);
    }

    #[test]
    fn test_gradients_through_time() {
        check_gradients(1, &[0.8, -0.3, 1.2, 0.1]);
    }

    #[test]
    fn test_gradients_multi_feature() {
        check_gradients(2, &[0.5, -1.0, 0.2, 0.7]);
    }

    #[test]
    fn test_sgd_rescales_by_batch_size() {
        let mut params = ModelParameters::xavier(1, 1, 1);
        let before = params.dense.b[0];
        let mut grads = ModelParameters::zeros_like(&params);
        grads.dense.b[0] = 48.0;
        let mut opt = SgdOptimizer::new(0.01, 48);
        opt.step(&mut params, &grads);
        assert!((params.dense.b[0] - (before - 0.01)).abs() < 1e-12);
        assert_eq!(params.version(), 1);
        assert_eq!(opt.steps(), 1);
    }

    #[test]
    fn test_training_reduces_loss() {
        let ctx = RunContext::default();
        let mut model = SequenceModel::new(&ctx, 1, RecurrentMode::Independent);
        let data: Vec<f64> = (0..64).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let loader = BatchLoader::new(data, 1, 8).unwrap();
        let before = evaluate_loss(&model, &loader).unwrap();
        let history = Trainer::new(30, 0.5, 8).train(&ctx, &mut model, &loader, &loader).unwrap();
        assert_eq!(history.epochs(), 30);
        assert!(history.final_training_mse().unwrap() < before);
        assert_eq!(model.parameters().version(), 30 * 8);
    }

    #[test]
    fn test_empty_training_rejected() {
        let ctx = RunContext::default();
        let mut model = SequenceModel::new(&ctx, 1, RecurrentMode::Independent);
        let empty = BatchLoader::new(Vec::new(), 1, 4).unwrap();
        let some = BatchLoader::new(vec![1.0], 1, 4).unwrap();
        let err = Trainer::new(1, 0.01, 4).train(&ctx, &mut model, &empty, &some).unwrap_err();
        assert!(matches!(err, DetectorError::EmptyInput { stage: Stage::Trainer, .. }));
    }

    #[test]
    fn test_divergence_is_fatal() {
        let ctx = RunContext::default();
        let mut model = SequenceModel::new(&ctx, 1, RecurrentMode::Independent);
        let loader = BatchLoader::new(vec![1.0, -1.0], 1, 2).unwrap();
        let err = Trainer::new(1, f64::INFINITY, 2)
            .train(&ctx, &mut model, &loader, &loader)
            .unwrap_err();
        assert!(matches!(err, DetectorError::NumericalDivergence { epoch: 1, batch: 0, .. }));
    }

    #[test]
    fn test_cancellation_stops_training() {
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let ctx = RunContext::default().with_cancellation(token);
        let mut model = SequenceModel::new(&ctx, 1, RecurrentMode::Independent);
        let loader = BatchLoader::new(vec![1.0, -1.0], 1, 2).unwrap();
        let err = Trainer::new(3, 0.01, 2).train(&ctx, &mut model, &loader, &loader).unwrap_err();
        assert!(matches!(err, DetectorError::Cancelled { epoch: 1 }));
        assert_eq!(model.parameters().version(), 0);
    }

    #[test]
    fn test_evaluate_loss_averages_batch_means() {
        let ctx = RunContext::default();
        let model = SequenceModel::new(&ctx, 1, RecurrentMode::Independent);
        let data = vec![0.2, 0.4, -0.6];
        let loader = BatchLoader::new(data.clone(), 1, 2).unwrap();
        let recon = model.forward(&Batch::new(&data, 1).unwrap()).unwrap();
        let errs: Vec<f64> = recon.iter().zip(&data).map(|(y, x)| (y - x) * (y - x)).collect();
        let expected = ((errs[0] + errs[1]) / 2.0 + errs[2]) / 2.0;
        assert!((evaluate_loss(&model, &loader).unwrap() - expected).abs() < 1e-12);
    }
}
