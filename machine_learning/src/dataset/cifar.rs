use std::path::Path;

use ndarray::Array2;

use super::{Dataset, normalize, read_file};
use crate::{MlErr, Result};

const SHAPE: [usize; 3] = [3, 32, 32];
const IMAGE_LEN: usize = 3 * 32 * 32;
const RECORD_LEN: usize = 1 + IMAGE_LEN;

/// Loads the five training batches of the binary CIFAR-10 distribution.
pub fn load_train(dir: &Path) -> Result<Dataset> {
    let mut buf = Vec::new();
    for i in 1..=5 {
        buf.extend(read_file(&dir.join(format!("data_batch_{i}.bin")))?);
    }

    parse(&buf)
}

/// Loads the testing batch of the binary CIFAR-10 distribution.
pub fn load_test(dir: &Path) -> Result<Dataset> {
    parse(&read_file(&dir.join("test_batch.bin"))?)
}

/// Decodes concatenated CIFAR-10 records, each a label byte followed by a 3×32×32 image.
pub fn parse(buf: &[u8]) -> Result<Dataset> {
    if buf.len() % RECORD_LEN != 0 {
        return Err(MlErr::DataUnavailable(format!(
            "cifar file of {} bytes is not a whole number of {RECORD_LEN} byte records",
            buf.len()
        )));
    }

    let len = buf.len() / RECORD_LEN;
    let mut labels = Vec::with_capacity(len);
    let mut pixels = Vec::with_capacity(len * IMAGE_LEN);

    for record in buf.chunks_exact(RECORD_LEN) {
        labels.push(record[0]);
        pixels.extend(record[1..].iter().copied().map(normalize));
    }

    let images = Array2::from_shape_vec((len, IMAGE_LEN), pixels)
        .map_err(|e| MlErr::DataUnavailable(format!("malformed cifar images: {e}")))?;

    Dataset::new(images, labels, SHAPE.to_vec())
}
