//! Image datasets and the per-client partitions trained on.

mod cifar;
mod idx;
mod partition;
mod synthetic;

use std::{fmt, io, path::Path, str::FromStr};

use ndarray::Array2;

pub use partition::Partition;
pub use synthetic::synthetic;

use crate::{MlErr, Result};

/// The amount of samples in the training and testing splits of the `synthetic` dataset.
pub const SYNTHETIC_LEN: (usize, usize) = (1024, 256);

/// A labelled image dataset, one flattened image per row.
#[derive(Debug, Clone)]
pub struct Dataset {
    images: Array2<f32>,
    labels: Vec<u8>,
    sample_shape: Vec<usize>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `images` - One flattened image per row.
    /// * `labels` - The class of every image.
    /// * `sample_shape` - The shape of a single image (e.g. `[1, 28, 28]`).
    ///
    /// # Returns
    /// A `SizeMismatch` error if the rows don't match the labels or the columns the sample shape.
    pub fn new(images: Array2<f32>, labels: Vec<u8>, sample_shape: Vec<usize>) -> Result<Self> {
        if images.nrows() != labels.len() {
            return Err(MlErr::SizeMismatch {
                what: "dataset labels",
                got: labels.len(),
                expected: images.nrows(),
            });
        }

        let sample_size: usize = sample_shape.iter().product();
        if images.ncols() != sample_size {
            return Err(MlErr::SizeMismatch {
                what: "dataset sample size",
                got: images.ncols(),
                expected: sample_size,
            });
        }

        Ok(Self {
            images,
            labels,
            sample_shape,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn images(&self) -> &Array2<f32> {
        &self.images
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn sample_shape(&self) -> &[usize] {
        &self.sample_shape
    }

    pub(crate) fn into_parts(self) -> (Array2<f32>, Vec<u8>, Vec<usize>) {
        (self.images, self.labels, self.sample_shape)
    }
}

/// The datasets a client can train on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSelector {
    Fmnist,
    Cifar10,
    Gtsrb,
    Synthetic,
}

impl fmt::Display for DatasetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatasetSelector::Fmnist => "fmnist",
            DatasetSelector::Cifar10 => "cifar10",
            DatasetSelector::Gtsrb => "gtsrb",
            DatasetSelector::Synthetic => "synthetic",
        };
        f.write_str(name)
    }
}

impl FromStr for DatasetSelector {
    type Err = MlErr;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fmnist" => Ok(DatasetSelector::Fmnist),
            "cifar10" => Ok(DatasetSelector::Cifar10),
            "gtsrb" => Ok(DatasetSelector::Gtsrb),
            "synthetic" => Ok(DatasetSelector::Synthetic),
            other => Err(MlErr::Config(format!("unsupported dataset {other}"))),
        }
    }
}

/// Loads the training and testing partitions of a dataset, keeping only `classes`.
///
/// # Arguments
/// * `selector` - Which dataset to load.
/// * `classes` - The labels to keep, all of them if empty.
/// * `dir` - The directory holding the dataset files.
/// * `seed` - Seeds the `synthetic` dataset.
///
/// # Returns
/// The `(train, test)` partitions, or a `DataUnavailable` error if either ends up empty.
pub fn load_partitions(
    selector: DatasetSelector,
    classes: &[u8],
    dir: &Path,
    seed: Option<u64>,
) -> Result<(Partition, Partition)> {
    let (train, test) = match selector {
        DatasetSelector::Fmnist => (idx::load(dir, "train")?, idx::load(dir, "t10k")?),
        DatasetSelector::Cifar10 => (cifar::load_train(dir)?, cifar::load_test(dir)?),
        DatasetSelector::Gtsrb => {
            return Err(MlErr::Config(
                "the gtsrb dataset can't be acquired by this client".into(),
            ));
        }
        DatasetSelector::Synthetic => {
            let (train_len, test_len) = SYNTHETIC_LEN;
            let shape = [1, 28, 28];
            (
                synthetic(train_len, &shape, seed)?,
                synthetic(test_len, &shape, seed.map(|s| s.wrapping_add(1)))?,
            )
        }
    };

    let train = Partition::filter(&train, classes);
    let test = Partition::filter(&test, classes);

    for (split, partition) in [("training", &train), ("testing", &test)] {
        if partition.is_empty() {
            return Err(MlErr::DataUnavailable(format!(
                "the {split} partition of {selector} has no samples of classes {classes:?}"
            )));
        }
    }

    Ok((train, test))
}

/// Maps a pixel from `[0, 255]` to `[-1, 1]`.
fn normalize(pixel: u8) -> f32 {
    (pixel as f32 / 255. - 0.5) / 0.5
}

/// Reads a whole dataset file, reporting a missing file as unavailable data.
fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            MlErr::DataUnavailable(format!("missing dataset file {}", path.display()))
        }
        _ => MlErr::Io(e),
    })
}
