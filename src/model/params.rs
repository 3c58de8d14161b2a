//! Trainable parameters of the sequence model.
//!
//! Layout follows the usual LSTM convention: gate rows are stacked in the
//! order input, forget, cell, output, so `w_ih` is `[4H x F]`, `w_hh` is
//! `[4H x H]` and `b` is `[4H]`, all row-major. The dense head maps the
//! hidden state back to feature space: `w` is `[F x H]`, `b` is `[F]`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Number of LSTM gates.
pub const NUM_GATES: usize = 4;

/// Xavier magnitude (uniform, averaged fan).
const XAVIER_MAGNITUDE: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LstmWeights {
    pub w_ih: Vec<f64>,
    pub w_hh: Vec<f64>,
    pub b: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DenseWeights {
    pub w: Vec<f64>,
    pub b: Vec<f64>,
}

/// Recurrent-cell and dense-layer parameters plus an update counter.
///
/// `version` starts at 0 and is bumped by every optimiser step, so two
/// parameter values can be told apart without comparing weights.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelParameters {
    pub lstm: LstmWeights,
    pub dense: DenseWeights,
    input_size: usize,
    hidden_size: usize,
    version: u64,
}

impl ModelParameters {
    /// Xavier-uniform weights from a seeded RNG, zero biases.
    pub fn xavier(input_size: usize, hidden_size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let gates = NUM_GATES * hidden_size;

        let w_ih = xavier_uniform(&mut rng, gates, input_size);
        let w_hh = xavier_uniform(&mut rng, gates, hidden_size);
        let w_dense = xavier_uniform(&mut rng, input_size, hidden_size);

        Self {
            lstm: LstmWeights {
                w_ih,
                w_hh,
                b: vec![0.0; gates],
            },
            dense: DenseWeights {
                w: w_dense,
                b: vec![0.0; input_size],
            },
            input_size,
            hidden_size,
            version: 0,
        }
    }

    /// Same shapes, every value zero. Used as a gradient accumulator.
    pub fn zeros_like(other: &Self) -> Self {
        Self {
            lstm: LstmWeights {
                w_ih: vec![0.0; other.lstm.w_ih.len()],
                w_hh: vec![0.0; other.lstm.w_hh.len()],
                b: vec![0.0; other.lstm.b.len()],
            },
            dense: DenseWeights {
                w: vec![0.0; other.dense.w.len()],
                b: vec![0.0; other.dense.b.len()],
            },
            input_size: other.input_size,
            hidden_size: other.hidden_size,
            version: 0,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Total number of trainable values.
    pub fn num_params(&self) -> usize {
        self.values().count()
    }

    /// Every trainable value, in a fixed order.
    pub fn values(&self) -> impl Iterator<Item = &f64> {
        self.lstm
            .w_ih
            .iter()
            .chain(&self.lstm.w_hh)
            .chain(&self.lstm.b)
            .chain(&self.dense.w)
            .chain(&self.dense.b)
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.lstm
            .w_ih
            .iter_mut()
            .chain(self.lstm.w_hh.iter_mut())
            .chain(self.lstm.b.iter_mut())
            .chain(self.dense.w.iter_mut())
            .chain(self.dense.b.iter_mut())
    }

    pub fn is_finite(&self) -> bool {
        self.values().all(|v| v.is_finite())
    }
}

/// `[rows x cols]` matrix drawn from U(-s, s), `s = sqrt(3 / ((fan_in + fan_out) / 2))`.
fn xavier_uniform(rng: &mut StdRng, rows: usize, cols: usize) -> Vec<f64> {
    #[allow(clippy::cast_precision_loss)]
    let fan_avg = (rows + cols) as f64 / 2.0;
    let scale = (XAVIER_MAGNITUDE / fan_avg.max(1.0)).sqrt();
    (0..rows * cols)
        .map(|_| rng.gen::<f64>() * 2.0 * scale - scale)
        .collect()
}
