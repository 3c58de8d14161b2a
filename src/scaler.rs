//! Standard-score feature scaling using Welford's algorithm.
//!
//! Statistics are accumulated in a single pass per feature and frozen in a
//! [`ScalerState`]. Variance is the population variance (divide by `n`).
//!
//! The pipeline deliberately scales the test series with
//! [`StandardScaler::fit_transform`], i.e. with statistics fitted on the test
//! series itself rather than the training statistics. See
//! [`crate::pipeline::TestNormalization`].

use serde::Serialize;

use crate::error::{DetectorError, Result, Stage};

/// Frozen per-feature statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalerState {
    mean: Vec<f64>,
    std: Vec<f64>,
    count: usize,
}

impl ScalerState {
    /// Fit statistics over row-major `values` with `feature_count` columns.
    pub fn fit(values: &[f64], feature_count: usize) -> Result<Self> {
        check_shape(values, feature_count)?;
        if values.is_empty() {
            return Err(DetectorError::empty(Stage::Scaler, "reference set has no samples"));
        }
        check_finite(values, feature_count)?;

        let mut count = 0usize;
        let mut mean = vec![0.0; feature_count];
        let mut m2 = vec![0.0; feature_count];

        for row in values.chunks_exact(feature_count) {
            count += 1;
            let n = count as f64;
            for (i, &x) in row.iter().enumerate() {
                let delta = x - mean[i];
                mean[i] += delta / n;
                let delta2 = x - mean[i];
                m2[i] += delta * delta2;
            }
        }

        let n = count as f64;
        let std: Vec<f64> = m2.iter().map(|&m| (m / n).sqrt()).collect();

        for (feature, (&mu, &sigma)) in mean.iter().zip(&std).enumerate() {
            if !(sigma.is_finite() && mu.is_finite()) || sigma <= 0.0 {
                return Err(DetectorError::DegenerateFeature {
                    feature,
                    mean: mu,
                    std: sigma,
                });
            }
        }

        Ok(Self { mean, std, count })
    }

    /// Apply `(v - mean) / std` elementwise.
    pub fn apply(&self, values: &[f64]) -> Result<Vec<f64>> {
        let f = self.feature_count();
        check_shape(values, f)?;
        check_finite(values, f)?;
        Ok(values
            .chunks_exact(f)
            .flat_map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(&self.std))
                    .map(|(&v, (&mu, &sigma))| (v - mu) / sigma)
            })
            .collect())
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std(&self) -> &[f64] {
        &self.std
    }

    /// Number of samples the statistics were fitted on.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn feature_count(&self) -> usize {
        self.mean.len()
    }
}

/// Scaler with fit / transform / fit_transform semantics.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    feature_count: usize,
    state: Option<ScalerState>,
}

impl StandardScaler {
    pub fn new(feature_count: usize) -> Self {
        Self {
            feature_count,
            state: None,
        }
    }

    /// Fit statistics on a reference set, replacing any previous fit.
    pub fn fit(&mut self, reference: &[f64]) -> Result<&ScalerState> {
        let state = ScalerState::fit(reference, self.feature_count)?;
        Ok(&*self.state.insert(state))
    }

    /// Scale with the previously fitted statistics.
    pub fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        self.state
            .as_ref()
            .ok_or(DetectorError::NotFitted { stage: Stage::Scaler })?
            .apply(values)
    }

    /// Fit fresh statistics on `values` and scale them with those statistics.
    pub fn fit_transform(&mut self, values: &[f64]) -> Result<Vec<f64>> {
        self.fit(values)?.apply(values)
    }

    pub fn state(&self) -> Option<&ScalerState> {
        self.state.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}

fn check_shape(values: &[f64], feature_count: usize) -> Result<()> {
    if feature_count == 0 || values.len() % feature_count != 0 {
        return Err(DetectorError::shape(
            Stage::Scaler,
            format!("a multiple of feature_count={feature_count} values"),
            format!("{} values", values.len()),
        ));
    }
    Ok(())
}

/// First non-finite value, reported by sample (row) index.
fn check_finite(values: &[f64], feature_count: usize) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(pos) => Err(DetectorError::NonFinite {
            stage: Stage::Scaler,
            sample: pos / feature_count,
            value: values[pos],
        }),
        None => Ok(()),
    }
}
