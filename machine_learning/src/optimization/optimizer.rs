use crate::Result;

pub trait Optimizer {
    /// Takes one optimization step, updating `params` in place.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the loss with respect to `params`.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the buffers don't match the optimizer's length.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}
