use std::{fmt, str::FromStr};

use rayon::prelude::*;

use crate::MlErr;

/// Where the elementwise numeric work of a model runs.
///
/// Passed explicitly to every model and optimizer that needs it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Device {
    /// Everything runs on the calling thread.
    #[default]
    Sequential,
    /// Elementwise work is split across the `rayon` thread pool.
    Parallel,
}

impl Device {
    /// Sets every element of `buf` to zero.
    ///
    /// # Arguments
    /// * `buf` - The buffer to clear.
    pub fn zero(&self, buf: &mut [f32]) {
        match self {
            Device::Sequential => buf.fill(0.),
            Device::Parallel => buf.par_iter_mut().for_each(|x| *x = 0.),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Sequential => f.write_str("sequential"),
            Device::Parallel => f.write_str("parallel"),
        }
    }
}

impl FromStr for Device {
    type Err = MlErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" | "cpu" => Ok(Device::Sequential),
            "parallel" => Ok(Device::Parallel),
            other => Err(MlErr::Config(format!("unknown device {other}"))),
        }
    }
}
