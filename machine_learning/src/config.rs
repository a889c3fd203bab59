use std::num::NonZeroUsize;

use crate::{Device, MlErr, Result};

/// Hyperparameters fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub epochs: NonZeroUsize,
    pub latent_size: NonZeroUsize,
    pub hidden_size: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub learning_rate: f32,
    pub kl_weight: f32,
    /// Seeds initialization, noise and shuffling. `None` seeds from the OS.
    pub seed: Option<u64>,
    pub device: Device,
}

impl TrainingConfig {
    pub const DEFAULT_EPOCHS: usize = 10;
    pub const DEFAULT_LATENT_SIZE: usize = 10;
    pub const DEFAULT_HIDDEN_SIZE: usize = 400;
    pub const DEFAULT_BATCH_SIZE: usize = 128;
    pub const DEFAULT_LEARNING_RATE: f32 = 0.001;
    pub const DEFAULT_KL_WEIGHT: f32 = 0.05;

    /// Checks the values that can't be enforced by their types.
    ///
    /// # Returns
    /// A `Config` error naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return Err(MlErr::Config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }

        if !(self.kl_weight.is_finite() && self.kl_weight >= 0.) {
            return Err(MlErr::Config(format!(
                "kl weight must be non negative, got {}",
                self.kl_weight
            )));
        }

        Ok(())
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let nz = |n| NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN);

        Self {
            epochs: nz(Self::DEFAULT_EPOCHS),
            latent_size: nz(Self::DEFAULT_LATENT_SIZE),
            hidden_size: nz(Self::DEFAULT_HIDDEN_SIZE),
            batch_size: nz(Self::DEFAULT_BATCH_SIZE),
            learning_rate: Self::DEFAULT_LEARNING_RATE,
            kl_weight: Self::DEFAULT_KL_WEIGHT,
            seed: None,
            device: Device::Sequential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs.get(), 10);
        assert_eq!(config.latent_size.get(), 10);
        assert_eq!(config.batch_size.get(), 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_hyperparameters() {
        let config = TrainingConfig {
            learning_rate: 0.,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MlErr::Config(_))));

        let config = TrainingConfig {
            kl_weight: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MlErr::Config(_))));
    }
}
