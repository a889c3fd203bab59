use ndarray::Array2;
use ndarray_rand::{RandomExt, rand_distr::StandardNormal};

use super::Dataset;
use crate::{Result, initialization::generate_rng};

/// Generates a dataset of standard normal noise "images" with labels cycling over ten classes.
///
/// # Arguments
/// * `len` - The amount of samples.
/// * `sample_shape` - The shape of a single image.
/// * `seed` - Seeds the noise.
pub fn synthetic(len: usize, sample_shape: &[usize], seed: Option<u64>) -> Result<Dataset> {
    let mut rng = generate_rng(seed);
    let sample_size = sample_shape.iter().product();

    let images = Array2::random_using((len, sample_size), StandardNormal, &mut rng);
    let labels = (0..len).map(|i| (i % 10) as u8).collect();

    Dataset::new(images, labels, sample_shape.to_vec())
}
