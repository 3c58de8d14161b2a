//! Reconstruction-error evaluator.
//!
//! Scores every sample of a loader with the mean squared difference
//! between its reconstruction and itself. Output order is batch order,
//! which is time order.

use rayon::prelude::*;
use tracing::debug;

use crate::batching::{Batch, BatchLoader};
use crate::context::{ExecutionTarget, RunContext};
use crate::error::{DetectorError, Result, Stage};
use crate::model::SequenceModel;
use crate::trainer::sample_loss;

/// One reconstruction error per sample, in input order.
pub fn compute_errors(
    ctx: &RunContext,
    model: &SequenceModel,
    loader: &BatchLoader,
) -> Result<Vec<f64>> {
    if loader.is_empty() {
        return Err(DetectorError::empty(Stage::Evaluator, "no samples to score"));
    }

    let per_batch: Vec<Vec<f64>> = match ctx.target() {
        ExecutionTarget::Cpu => loader
            .iter()
            .map(|batch| score_batch(model, &batch))
            .collect::<Result<_>>()?,
        ExecutionTarget::CpuParallel => {
            let batches: Vec<Batch<'_>> = loader.iter().collect();
            batches
                .par_iter()
                .map(|batch| score_batch(model, batch))
                .collect::<Result<_>>()?
        }
    };

    let errors: Vec<f64> = per_batch.into_iter().flatten().collect();
    debug!(
        samples = errors.len(),
        target = %ctx.target(),
        "Reconstruction errors computed"
    );
    Ok(errors)
}

fn score_batch(model: &SequenceModel, batch: &Batch<'_>) -> Result<Vec<f64>> {
    let recon = model.forward(batch)?;
    let f = batch.feature_count();
    Ok(recon
        .chunks_exact(f)
        .zip(batch.samples())
        .map(|(y, x)| sample_loss(y, x))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecurrentMode;

    fn data(n: usize) -> Vec<f64> {
        (0..n).map(|i| ((i as f64) * 0.37).sin()).collect()
    }

    #[test]
    fn test_length_and_order_across_batches() {
        let ctx = RunContext::default();
        let model = SequenceModel::new(&ctx, 1, RecurrentMode::Independent);
        let values = data(11);

        let whole_loader = BatchLoader::new(values.clone(), 1, 11).unwrap();
        let split_loader = BatchLoader::new(values, 1, 4).unwrap();
        let whole = compute_errors(&ctx, &model, &whole_loader).unwrap();
        let split = compute_errors(&ctx, &model, &split_loader).unwrap();

        assert_eq!(whole.len(), 11);
        assert_eq!(whole, split);
        assert!(whole.iter().all(|e| *e >= 0.0));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let seq_ctx = RunContext::new(ExecutionTarget::Cpu, 9);
        let par_ctx = RunContext::new(ExecutionTarget::CpuParallel, 9);
        let model = SequenceModel::new(&seq_ctx, 1, RecurrentMode::BatchSequence);
        let loader = BatchLoader::new(data(100), 1, 7).unwrap();

        assert_eq!(
            compute_errors(&seq_ctx, &model, &loader).unwrap(),
            compute_errors(&par_ctx, &model, &loader).unwrap()
        );
    }

    #[test]
    fn test_empty_loader_rejected() {
        let ctx = RunContext::default();
        let model = SequenceModel::new(&ctx, 1, RecurrentMode::Independent);
        let loader = BatchLoader::new(Vec::new(), 1, 4).unwrap();
        let err = compute_errors(&ctx, &model, &loader).unwrap_err();
        assert!(matches!(err, DetectorError::EmptyInput { stage: Stage::Evaluator, .. }));
    }

    #[test]
    fn test_multi_feature_error_is_feature_mean() {
        let ctx = RunContext::default();
        let model = SequenceModel::new(&ctx, 2, RecurrentMode::Independent);
        let values = vec![0.5, -0.5, 1.0, 0.0];
        let loader = BatchLoader::new(values.clone(), 2, 2).unwrap();
        let errors = compute_errors(&ctx, &model, &loader).unwrap();
        let recon = model.forward(&Batch::new(&values, 2).unwrap()).unwrap();
        let first = ((recon[0] - 0.5).powi(2) + (recon[1] + 0.5).powi(2)) / 2.0;
        assert_eq!(errors.len(), 2);
        assert!((errors[0] - first).abs() < 1e-15);
    }
}
