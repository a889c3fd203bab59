use std::num::NonZeroUsize;

use ndarray::{Array2, ArrayView2, Axis};

use super::Dataset;

/// The ordered subset of a dataset a client trains or evaluates on.
#[derive(Debug, Clone)]
pub struct Partition {
    images: Array2<f32>,
    labels: Vec<u8>,
    sample_shape: Vec<usize>,
}

impl Partition {
    /// Keeps the samples of `dataset` whose label is in `classes`, in their original order.
    ///
    /// # Arguments
    /// * `dataset` - The base dataset.
    /// * `classes` - The labels to keep, all of them if empty.
    pub fn filter(dataset: &Dataset, classes: &[u8]) -> Self {
        let keep: Vec<usize> = dataset
            .labels()
            .iter()
            .enumerate()
            .filter(|&(_, label)| classes.is_empty() || classes.contains(label))
            .map(|(i, _)| i)
            .collect();

        Self {
            images: dataset.images().select(Axis(0), &keep),
            labels: keep.iter().map(|&i| dataset.labels()[i]).collect(),
            sample_shape: dataset.sample_shape().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn images(&self) -> ArrayView2<'_, f32> {
        self.images.view()
    }

    pub fn sample_shape(&self) -> &[usize] {
        &self.sample_shape
    }

    /// The amount of scalars of a single flattened sample.
    pub fn sample_size(&self) -> usize {
        self.images.ncols()
    }

    /// Iterates over the partition in consecutive batches, the last one possibly smaller.
    ///
    /// # Arguments
    /// * `batch_size` - The amount of samples per batch.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, &[u8])> {
        let n = batch_size.get();
        self.images
            .axis_chunks_iter(Axis(0), n)
            .zip(self.labels.chunks(n))
    }

    /// Iterates over the samples picked by `order` in batches, the last one possibly
    /// smaller. Every batch is gathered into its own array, the partition is left as is.
    ///
    /// # Arguments
    /// * `order` - The sample indices to visit, usually a permutation.
    /// * `batch_size` - The amount of samples per batch.
    pub fn batches_in<'a>(
        &'a self,
        order: &'a [usize],
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = (Array2<f32>, Vec<u8>)> + 'a {
        order.chunks(batch_size.get()).map(|idx| {
            let images = self.images.select(Axis(0), idx);
            let labels = idx.iter().map(|&i| self.labels[i]).collect();
            (images, labels)
        })
    }
}

impl From<Dataset> for Partition {
    fn from(dataset: Dataset) -> Self {
        let (images, labels, sample_shape) = dataset.into_parts();

        Self {
            images,
            labels,
            sample_shape,
        }
    }
}
