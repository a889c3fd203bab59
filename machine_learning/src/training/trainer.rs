use std::num::NonZeroUsize;

use log::{debug, info};
use rand::{rngs::StdRng, seq::SliceRandom};

use super::{EvaluationMetrics, Evaluator};
use crate::{
    Device, Result, TrainingConfig,
    arch::{Vae, loss::VaeLoss},
    dataset::Partition,
    initialization::generate_rng,
    optimization::Adam,
};

/// Trains a model on its local partition, one optimizer step per batch.
pub struct Trainer {
    batch_size: NonZeroUsize,
    learning_rate: f32,
    loss: VaeLoss,
    device: Device,
    rng: StdRng,
}

impl Trainer {
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `config` - The training hyperparameters, its seed also drives the shuffling.
    ///
    /// # Returns
    /// A new `Trainer` instance.
    pub fn new(config: &TrainingConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            learning_rate: config.learning_rate,
            loss: VaeLoss::new(config.kl_weight),
            device: config.device,
            rng: generate_rng(config.seed.map(|s| s.wrapping_add(2))),
        }
    }

    /// An evaluator sharing this trainer's batch size and objective.
    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.batch_size, self.loss)
    }

    /// Runs `epochs` full passes over `train`, visiting its samples in a fresh random
    /// order each time. The partition itself is never reordered.
    ///
    /// A fresh optimizer is created on every call, nothing of its state survives between calls.
    ///
    /// # Arguments
    /// * `model` - The model to train.
    /// * `train` - The training partition.
    /// * `test` - A testing partition to report on, only when verbose.
    /// * `epochs` - The amount of passes over `train`.
    /// * `verbose` - Whether to evaluate and log the metrics after every epoch.
    ///
    /// # Returns
    /// The amount of optimizer steps taken.
    pub fn train(
        &mut self,
        model: &mut Vae,
        train: &Partition,
        test: Option<&Partition>,
        epochs: usize,
        verbose: bool,
    ) -> Result<usize> {
        let mut optimizer = Adam::with_defaults(model.size(), self.learning_rate).on(self.device);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut steps = 0;

        for epoch in 0..epochs {
            order.shuffle(&mut self.rng);

            for (x, _) in train.batches_in(&order, self.batch_size) {
                steps += model.backprop(&self.loss, &mut optimizer, [x.view()])?;
            }

            debug!(epoch = epoch, steps = steps; "finished epoch");

            if verbose {
                self.log_metrics(model, epoch, train, test)?;
            }
        }

        Ok(steps)
    }

    fn log_metrics(
        &self,
        model: &mut Vae,
        epoch: usize,
        train: &Partition,
        test: Option<&Partition>,
    ) -> Result<()> {
        let evaluator = self.evaluator();
        let train = evaluator.evaluate(model, train)?;
        let test = match test {
            Some(test) => Some(evaluator.evaluate(model, test)?),
            None => None,
        };

        info!("Metrics at epoch {epoch}: {}", Report { train, test });
        Ok(())
    }
}

struct Report {
    train: EvaluationMetrics,
    test: Option<EvaluationMetrics>,
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "training backprop loss {:.6}, training recon loss {:.6}",
            self.train.backprop_loss, self.train.reconstruction_loss
        )?;

        if let Some(test) = self.test {
            write!(
                f,
                ", testing backprop loss {:.6}, testing recon loss {:.6}",
                test.backprop_loss, test.reconstruction_loss
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arch::VaeConfig, dataset::synthetic};

    fn config(batch_size: usize) -> TrainingConfig {
        TrainingConfig {
            batch_size: NonZeroUsize::new(batch_size).unwrap(),
            seed: Some(0),
            ..Default::default()
        }
    }

    fn vae() -> Vae {
        Vae::new(VaeConfig {
            input_size: 8,
            hidden_size: 6,
            latent_size: 2,
            seed: Some(0),
            device: Device::Sequential,
        })
        .unwrap()
    }

    #[test]
    fn one_step_per_batch() {
        let train: Partition = synthetic(256, &[8], Some(1)).unwrap().into();
        let mut trainer = Trainer::new(&config(128));

        let steps = trainer.train(&mut vae(), &train, None, 1, false).unwrap();
        assert_eq!(steps, 2);

        let steps = trainer.train(&mut vae(), &train, None, 3, false).unwrap();
        assert_eq!(steps, 6);
    }

    #[test]
    fn last_batch_may_be_partial() {
        let train: Partition = synthetic(130, &[8], Some(1)).unwrap().into();
        let mut trainer = Trainer::new(&config(128));

        let steps = trainer.train(&mut vae(), &train, None, 2, false).unwrap();
        assert_eq!(steps, 4);
    }

    #[test]
    fn zero_epochs_leave_the_model_untouched() {
        let train: Partition = synthetic(10, &[8], Some(1)).unwrap().into();
        let mut trainer = Trainer::new(&config(4));
        let mut model = vae();
        let before = model.get_parameters().unwrap();

        let steps = trainer.train(&mut model, &train, None, 0, true).unwrap();
        assert_eq!(steps, 0);
        assert_eq!(model.get_parameters().unwrap(), before);
    }

    #[test]
    fn training_changes_the_weights_and_keeps_the_samples() {
        let train: Partition = synthetic(32, &[8], Some(1)).unwrap().into();
        let test: Partition = synthetic(16, &[8], Some(2)).unwrap().into();
        let mut trainer = Trainer::new(&config(8));
        let mut model = vae();
        let before = model.get_parameters().unwrap();

        trainer.train(&mut model, &train, Some(&test), 2, true).unwrap();

        assert_ne!(model.get_parameters().unwrap(), before);
        assert_eq!(train.len(), 32);
    }

    #[test]
    fn training_leaves_the_partition_in_place() {
        let train: Partition = synthetic(40, &[8], Some(1)).unwrap().into();
        let snapshot = train.clone();
        let mut trainer = Trainer::new(&config(16));

        trainer.train(&mut vae(), &train, None, 3, false).unwrap();

        assert_eq!(train.labels(), snapshot.labels());
        assert_eq!(train.images(), snapshot.images());
    }
}
