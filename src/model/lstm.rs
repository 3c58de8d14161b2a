//! LSTM cell and dense reconstruction head.
//!
//! One timestep:
//!
//! ```text
//! z      = W_ih * x + W_hh * h_prev + b
//! i      = sigmoid(z[0..H])
//! f      = sigmoid(z[H..2H])
//! g      = tanh(z[2H..3H])
//! o      = sigmoid(z[3H..4H])
//! c      = f * c_prev + i * g
//! h      = o * tanh(c)
//! y      = tanh(W_d * h + b_d)
//! ```
//!
//! Every step records a [`StepCache`] so the trainer can backpropagate
//! without re-running the forward pass.

use crate::model::params::{ModelParameters, NUM_GATES};

/// Intermediate values of one timestep, needed for backprop.
#[derive(Debug, Clone)]
pub struct StepCache {
    /// Input at this step.
    pub x: Vec<f64>,
    /// Hidden and cell state entering the step.
    pub h_prev: Vec<f64>,
    pub c_prev: Vec<f64>,
    /// Gate activations.
    pub i_gate: Vec<f64>,
    pub f_gate: Vec<f64>,
    pub g_gate: Vec<f64>,
    pub o_gate: Vec<f64>,
    /// Cell state after the step and its tanh.
    pub c: Vec<f64>,
    pub tanh_c: Vec<f64>,
    /// Hidden state after the step.
    pub h: Vec<f64>,
    /// Reconstruction emitted by the dense head.
    pub y: Vec<f64>,
}

pub struct LstmCell;

impl LstmCell {
    /// Run one timestep from `(h_prev, c_prev)`.
    pub fn step(params: &ModelParameters, x: &[f64], h_prev: &[f64], c_prev: &[f64]) -> StepCache {
        let n_in = params.input_size();
        let n_h = params.hidden_size();
        let w = &params.lstm;

        let mut z = w.b.clone();
        for (r, zr) in z.iter_mut().enumerate() {
            let row_ih = &w.w_ih[r * n_in..(r + 1) * n_in];
            let row_hh = &w.w_hh[r * n_h..(r + 1) * n_h];
            *zr += dot(row_ih, x) + dot(row_hh, h_prev);
        }

        let i_gate: Vec<f64> = z[0..n_h].iter().map(|&v| sigmoid(v)).collect();
        let f_gate: Vec<f64> = z[n_h..2 * n_h].iter().map(|&v| sigmoid(v)).collect();
        let g_gate: Vec<f64> = z[2 * n_h..3 * n_h].iter().map(|&v| v.tanh()).collect();
        let o_gate: Vec<f64> = z[3 * n_h..NUM_GATES * n_h].iter().map(|&v| sigmoid(v)).collect();

        let c: Vec<f64> = (0..n_h)
            .map(|k| f_gate[k] * c_prev[k] + i_gate[k] * g_gate[k])
            .collect();
        let tanh_c: Vec<f64> = c.iter().map(|v| v.tanh()).collect();
        let h: Vec<f64> = (0..n_h).map(|k| o_gate[k] * tanh_c[k]).collect();

        let d = &params.dense;
        let y: Vec<f64> = (0..n_in)
            .map(|o| (d.b[o] + dot(&d.w[o * n_h..(o + 1) * n_h], &h)).tanh())
            .collect();

        StepCache {
            x: x.to_vec(),
            h_prev: h_prev.to_vec(),
            c_prev: c_prev.to_vec(),
            i_gate,
            f_gate,
            g_gate,
            o_gate,
            c,
            tanh_c,
            h,
            y,
        }
    }

    /// Run a sequence from zero state, carrying `(h, c)` between steps.
    pub fn forward_sequence<'a, I>(params: &ModelParameters, inputs: I) -> Vec<StepCache>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let n_h = params.hidden_size();
        let mut h = vec![0.0; n_h];
        let mut c = vec![0.0; n_h];
        let mut caches = Vec::new();

        for x in inputs {
            let cache = Self::step(params, x, &h, &c);
            h.clone_from(&cache.h);
            c.clone_from(&cache.c);
            caches.push(cache);
        }

        caches
    }
}

#[inline]
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_input_zero_bias_gives_zero_output() {
        let params = ModelParameters::xavier(1, 1, 42);
        let cache = LstmCell::step(&params, &[0.0], &[0.0], &[0.0]);
        assert_eq!(cache.y, vec![0.0]);
        assert_eq!(cache.h, vec![0.0]);
    }

    #[test]
    fn test_output_bounded_by_tanh() {
        let params = ModelParameters::xavier(2, 2, 5);
        let cache = LstmCell::step(&params, &[1e6, -1e6], &[0.0, 0.0], &[0.0, 0.0]);
        assert!(cache.y.iter().all(|v| v.abs() <= 1.0 && v.is_finite()));
    }

    #[test]
    fn test_sequence_carries_state() {
        let params = ModelParameters::xavier(1, 1, 11);
        let xs = [[0.5], [0.5]];
        let caches = LstmCell::forward_sequence(&params, xs.iter().map(|x| &x[..]));
        assert_eq!(caches.len(), 2);
        assert_eq!(caches[1].h_prev, caches[0].h);
        assert_eq!(caches[1].c_prev, caches[0].c);
        assert_eq!(caches[0].h_prev, vec![0.0]);
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(100.0) > 0.999);
        assert!(sigmoid(-100.0) < 0.001);
    }
}
