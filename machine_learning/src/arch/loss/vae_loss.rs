use ndarray::{Array2, ArrayView2};

use super::{GaussianKl, LossFn, Mse};

/// The parts of the VAE objective for one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LossParts {
    pub reconstruction: f32,
    pub kl: f32,
    /// `reconstruction + kl_weight * kl`, what backpropagation minimises.
    pub total: f32,
}

/// Reconstruction MSE plus a weighted KL divergence towards the standard normal prior.
#[derive(Debug, Clone, Copy)]
pub struct VaeLoss {
    recon: Mse,
    kl: GaussianKl,
    kl_weight: f32,
}

impl VaeLoss {
    pub fn new(kl_weight: f32) -> Self {
        Self {
            recon: Mse,
            kl: GaussianKl,
            kl_weight,
        }
    }

    /// Computes every part of the loss for a batch.
    ///
    /// # Arguments
    /// * `reconstruction` - The decoded batch.
    /// * `x` - The original batch.
    /// * `mean` - The encoder's mean.
    /// * `log_var` - The encoder's log variance.
    pub fn loss(
        &self,
        reconstruction: ArrayView2<f32>,
        x: ArrayView2<f32>,
        mean: ArrayView2<f32>,
        log_var: ArrayView2<f32>,
    ) -> LossParts {
        let reconstruction = self.recon.loss(reconstruction, x);
        let kl = self.kl.loss(mean, log_var);

        LossParts {
            reconstruction,
            kl,
            total: reconstruction + self.kl_weight * kl,
        }
    }

    /// The derivative of the total loss with respect to the reconstruction.
    pub fn reconstruction_prime(
        &self,
        reconstruction: ArrayView2<f32>,
        x: ArrayView2<f32>,
    ) -> Array2<f32> {
        self.recon.loss_prime(reconstruction, x)
    }

    /// The derivative of the weighted KL term with respect to the mean and the log variance.
    pub fn kl_prime(
        &self,
        mean: ArrayView2<f32>,
        log_var: ArrayView2<f32>,
    ) -> (Array2<f32>, Array2<f32>) {
        let (d_mean, d_log_var) = self.kl.loss_prime(mean, log_var);
        (d_mean * self.kl_weight, d_log_var * self.kl_weight)
    }
}
