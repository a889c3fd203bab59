use std::path::Path;

use ndarray::Array2;

use super::{Dataset, normalize, read_file};
use crate::{MlErr, Result};

const IMAGES_MAGIC: u32 = 0x0803;
const LABELS_MAGIC: u32 = 0x0801;

/// Loads a split of an IDX encoded dataset such as Fashion-MNIST.
///
/// # Arguments
/// * `dir` - The directory holding the decompressed IDX files.
/// * `split` - The file prefix, `train` or `t10k`.
pub fn load(dir: &Path, split: &str) -> Result<Dataset> {
    let images = read_file(&dir.join(format!("{split}-images-idx3-ubyte")))?;
    let labels = read_file(&dir.join(format!("{split}-labels-idx1-ubyte")))?;
    parse(&images, &labels)
}

/// Decodes an images file and its labels file.
pub fn parse(images: &[u8], labels: &[u8]) -> Result<Dataset> {
    let (dims, pixels) = parse_header(images, IMAGES_MAGIC, 3)?;
    let (label_dims, labels) = parse_header(labels, LABELS_MAGIC, 1)?;

    let (len, rows, cols) = (dims[0], dims[1], dims[2]);
    if label_dims[0] != len {
        return Err(MlErr::DataUnavailable(format!(
            "the idx files hold {len} images but {} labels",
            label_dims[0]
        )));
    }

    let images = Array2::from_shape_vec(
        (len, rows.saturating_mul(cols)),
        pixels.iter().copied().map(normalize).collect(),
    )
    .map_err(|e| MlErr::DataUnavailable(format!("malformed idx images: {e}")))?;

    Dataset::new(images, labels.to_vec(), vec![1, rows, cols])
}

/// Validates the magic number and dimensions of an IDX file.
///
/// # Returns
/// The dimensions and the data following the header, exactly as long as they declare.
fn parse_header(buf: &[u8], magic: u32, ndims: usize) -> Result<(Vec<usize>, &[u8])> {
    let header_len = 4 * (ndims + 1);
    if buf.len() < header_len {
        return Err(truncated(buf.len(), header_len));
    }

    let words: Vec<u32> = buf[..header_len]
        .chunks_exact(4)
        .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
        .collect();

    if words[0] != magic {
        return Err(MlErr::DataUnavailable(format!(
            "bad idx magic number {:#010x}, expected {magic:#010x}",
            words[0]
        )));
    }

    let dims: Vec<usize> = words[1..].iter().map(|&d| d as usize).collect();
    let expected = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .and_then(|n| n.checked_add(header_len))
        .ok_or_else(|| {
            MlErr::DataUnavailable(format!("idx header declares oversized dimensions {dims:?}"))
        })?;
    if buf.len() != expected {
        return Err(truncated(buf.len(), expected));
    }

    Ok((dims, &buf[header_len..]))
}

fn truncated(got: usize, expected: usize) -> MlErr {
    MlErr::DataUnavailable(format!(
        "idx file is {got} bytes long, its header declares {expected}"
    ))
}
