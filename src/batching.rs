//! Ordered, restartable batching of a scaled series.
//!
//! A [`BatchLoader`] owns the scaled samples and hands out borrowed
//! [`Batch`] views in time order. Each call to [`BatchLoader::iter`] starts a
//! fresh pass, so the trainer restarts iteration once per epoch. There is no
//! shuffling: the final batch is simply shorter when the sample count is not
//! a multiple of the batch size.

use crate::error::{DetectorError, Result, Stage};

/// Borrowed view of consecutive samples, shape `(len, 1, feature_count)`.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    data: &'a [f64],
    feature_count: usize,
}

impl<'a> Batch<'a> {
    /// Wrap row-major values as a batch of single-step samples.
    pub fn new(data: &'a [f64], feature_count: usize) -> Result<Self> {
        if feature_count == 0 || data.len() % feature_count != 0 {
            return Err(DetectorError::shape(
                Stage::Batching,
                format!("(n, 1, {feature_count})"),
                format!("{} values", data.len()),
            ));
        }
        Ok(Self { data, feature_count })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.data.len() / self.feature_count
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// `(batch_size, sequence_length, feature_count)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.len(), 1, self.feature_count)
    }

    /// Samples in time order, one slice of `feature_count` values each.
    pub fn samples(&self) -> std::slice::ChunksExact<'a, f64> {
        self.data.chunks_exact(self.feature_count)
    }

    pub fn as_slice(&self) -> &'a [f64] {
        self.data
    }
}

/// Owns a scaled series and produces batches in order.
#[derive(Debug, Clone)]
pub struct BatchLoader {
    data: Vec<f64>,
    feature_count: usize,
    batch_size: usize,
}

impl BatchLoader {
    pub fn new(data: Vec<f64>, feature_count: usize, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(DetectorError::shape(Stage::Batching, "batch_size > 0", "0"));
        }
        Batch::new(&data, feature_count)?;
        Ok(Self {
            data,
            feature_count,
            batch_size,
        })
    }

    /// Start a new pass over the data.
    pub fn iter(&self) -> Batches<'_> {
        Batches {
            loader: self,
            next_sample: 0,
        }
    }

    pub fn num_samples(&self) -> usize {
        self.data.len() / self.feature_count
    }

    pub fn num_batches(&self) -> usize {
        self.num_samples().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

impl<'a> IntoIterator for &'a BatchLoader {
    type Item = Batch<'a>;
    type IntoIter = Batches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over a [`BatchLoader`].
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    loader: &'a BatchLoader,
    next_sample: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.loader.num_samples();
        if self.next_sample >= total {
            return None;
        }
        let f = self.loader.feature_count;
        let end = (self.next_sample + self.loader.batch_size).min(total);
        let data = &self.loader.data[self.next_sample * f..end * f];
        self.next_sample = end;
        Some(Batch {
            data,
            feature_count: f,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .loader
            .num_samples()
            .saturating_sub(self.next_sample)
            .div_ceil(self.loader.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}

/// Split row-major values into leading training and trailing validation parts.
///
/// The cut is `floor(rows * fraction)`. Both parts must be non-empty.
pub fn split_train_validation(
    values: &[f64],
    feature_count: usize,
    fraction: f64,
) -> Result<(Vec<f64>, Vec<f64>)> {
    Batch::new(values, feature_count)?;
    let rows = values.len() / feature_count;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let cut = (rows as f64 * fraction) as usize;
    if cut == 0 || cut >= rows {
        return Err(DetectorError::empty(
            Stage::Batching,
            format!(
                "split fraction {fraction} of {rows} samples leaves an empty train or validation set"
            ),
        ));
    }
    let (train, validation) = values.split_at(cut * feature_count);
    Ok((train.to_vec(), validation.to_vec()))
}
