use std::num::NonZeroUsize;

use crate::{
    Result,
    arch::{Vae, loss::VaeLoss},
    dataset::Partition,
};

/// The losses of a model over a whole partition.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct EvaluationMetrics {
    /// Mean of the composite loss (reconstruction + β·KL).
    pub backprop_loss: f32,
    /// Mean of the reconstruction error alone.
    pub reconstruction_loss: f32,
}

/// Computes losses over partitions without updating the model's parameters.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    batch_size: NonZeroUsize,
    loss: VaeLoss,
}

impl Evaluator {
    /// Creates a new `Evaluator`.
    ///
    /// # Arguments
    /// * `batch_size` - The amount of samples per forward pass.
    /// * `loss` - The objective used while training.
    pub fn new(batch_size: NonZeroUsize, loss: VaeLoss) -> Self {
        Self { batch_size, loss }
    }

    /// Computes both losses in a single pass over `partition`, each batch weighted by its size.
    ///
    /// # Arguments
    /// * `model` - The model to evaluate, only its noise source advances.
    /// * `partition` - The samples to evaluate on.
    pub fn evaluate(&self, model: &mut Vae, partition: &Partition) -> Result<EvaluationMetrics> {
        if partition.is_empty() {
            return Ok(EvaluationMetrics::default());
        }

        let mut backprop = 0.;
        let mut reconstruction = 0.;

        for (x, _) in partition.batches(self.batch_size) {
            let out = model.forward(x)?;
            let parts = self.loss.loss(
                out.reconstruction.view(),
                x,
                out.mean.view(),
                out.log_var.view(),
            );

            let n = x.nrows() as f32;
            backprop += parts.total * n;
            reconstruction += parts.reconstruction * n;
        }

        let len = partition.len() as f32;
        Ok(EvaluationMetrics {
            backprop_loss: backprop / len,
            reconstruction_loss: reconstruction / len,
        })
    }

    pub fn backprop_loss(&self, model: &mut Vae, partition: &Partition) -> Result<f32> {
        Ok(self.evaluate(model, partition)?.backprop_loss)
    }

    pub fn reconstruction_loss(&self, model: &mut Vae, partition: &Partition) -> Result<f32> {
        Ok(self.evaluate(model, partition)?.reconstruction_loss)
    }
}
