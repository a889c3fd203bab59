use rayon::prelude::*;

use super::Optimizer;
use crate::{Device, MlErr, Result};

#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Box<[f32]>,
    s: Box<[f32]>,
    epsilon: f32,
    device: Device,
}

impl Adam {
    pub const BETA1: f32 = 0.9;
    pub const BETA2: f32 = 0.999;
    pub const EPSILON: f32 = 1e-8;

    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            v: vec![0.; len].into_boxed_slice(),
            s: vec![0.; len].into_boxed_slice(),
            epsilon,
            device: Device::Sequential,
        }
    }

    /// Creates a new `Adam` optimizer with the usual hyperparameters
    /// (β1 = 0.9, β2 = 0.999, ε = 1e-8).
    pub fn with_defaults(len: usize, learning_rate: f32) -> Self {
        Self::new(len, learning_rate, Self::BETA1, Self::BETA2, Self::EPSILON)
    }

    /// Sets where the updates run.
    pub fn on(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        if grad.len() != params.len() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: params.len(),
            });
        }

        if params.len() != self.v.len() {
            return Err(MlErr::SizeMismatch {
                what: "optimizer state",
                got: params.len(),
                expected: self.v.len(),
            });
        }

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        let step = |(((p, g), v), s): (((&mut f32, &f32), &mut f32), &mut f32)| {
            *v = b1 * *v + (1. - b1) * g;
            *s = b2 * *s + (1. - b2) * g.powi(2);
            *p -= step_size * *v / (s.sqrt() + eps);
        };

        match self.device {
            Device::Sequential => params
                .iter_mut()
                .zip(grad)
                .zip(self.v.iter_mut())
                .zip(self.s.iter_mut())
                .for_each(step),
            Device::Parallel => params
                .par_iter_mut()
                .zip(grad)
                .zip(self.v.par_iter_mut())
                .zip(self.s.par_iter_mut())
                .for_each(step),
        }

        Ok(())
    }
}
