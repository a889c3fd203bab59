use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use super::ParamGen;
use crate::{MlErr, Result};

/// A parameter generator that follows a certain probabilistic distribution.
pub struct RandParamGen<R: Rng, D: Distribution<f32>> {
    rng: Rc<RefCell<R>>,
    distribution: D,
    remaining: usize,
}

impl<R: Rng, D: Distribution<f32>> RandParamGen<R, D> {
    /// Creates a new `RandParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `rng` - A random number generator, shared with the other generators of the model.
    /// * `distribution` - The distribution to sample the random numbers from.
    /// * `limit` - The maximum amount of numbers to generate.
    pub fn new(rng: Rc<RefCell<R>>, distribution: D, limit: usize) -> Self {
        Self {
            rng,
            distribution,
            remaining: limit,
        }
    }
}

impl<R: Rng> RandParamGen<R, Uniform<f32>> {
    /// Creates a new `RandParamGen` parameter generator with a uniform distribution.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `low` - The inclusive lower limit.
    /// * `high` - The exclusive upper limit.
    ///
    /// # Returns
    /// An error if the range is invalid (low >= high).
    pub fn uniform(rng: Rc<RefCell<R>>, limit: usize, low: f32, high: f32) -> Result<Self> {
        Ok(Self::new(rng, Uniform::new(low, high)?, limit))
    }

    /// Creates a new `RandParamGen` parameter generator sampling from ±1/√fan_in,
    /// the default range for the weights and biases of a dense layer.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `fan_in` - The number of input units of the layer.
    ///
    /// # Returns
    /// An error if `fan_in` is zero.
    pub fn fan_in_uniform(rng: Rc<RefCell<R>>, limit: usize, fan_in: usize) -> Result<Self> {
        if fan_in == 0 {
            return Err(MlErr::Init("fan in must be positive".into()));
        }

        let range = 1. / (fan_in as f32).sqrt();
        Self::uniform(rng, limit, -range, range)
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen for RandParamGen<R, D> {
    fn sample(&mut self, mut n: usize) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }

        n = n.min(self.remaining);
        self.remaining -= n;

        let mut rng = self.rng.borrow_mut();
        let sample = (0..n).map(|_| self.distribution.sample(&mut *rng)).collect();
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn seeded_rng() -> Rc<RefCell<StdRng>> {
        Rc::new(RefCell::new(StdRng::seed_from_u64(42)))
    }

    #[test]
    fn empty() {
        let mut param_gen = RandParamGen::uniform(seeded_rng(), 0, -1., 1.).unwrap();
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn partial() {
        let mut param_gen = RandParamGen::uniform(seeded_rng(), 10, -1., 1.).unwrap();

        assert_eq!(param_gen.sample(7).unwrap().len(), 7);
        assert_eq!(param_gen.sample(7).unwrap().len(), 3);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn fan_in_uniform_stays_in_range() {
        let mut param_gen = RandParamGen::fan_in_uniform(seeded_rng(), 1000, 16).unwrap();
        let sample = param_gen.sample(1000).unwrap();

        assert!(sample.iter().all(|x| x.abs() <= 0.25));
    }

    #[test]
    fn invalid_ranges() {
        assert!(RandParamGen::uniform(seeded_rng(), 1, 1., -1.).is_err());
        assert!(RandParamGen::fan_in_uniform(seeded_rng(), 1, 0).is_err());
    }
}
