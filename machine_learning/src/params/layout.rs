use comms::specs::round::TensorSpec;

use super::ParameterVector;
use crate::{MlErr, Result};

/// The fixed, ordered list of parameter slots a model declares.
///
/// The model's flat parameter buffer is the concatenation of every slot in this order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamLayout {
    slots: Vec<TensorSpec>,
    size: usize,
}

impl ParamLayout {
    /// Creates a new `ParamLayout`.
    ///
    /// # Arguments
    /// * `slots` - The name and shape of every parameter tensor, in declared order.
    ///
    /// # Returns
    /// A new `ParamLayout` instance.
    pub fn new(slots: Vec<TensorSpec>) -> Self {
        let size = slots.iter().map(TensorSpec::len).sum();
        Self { slots, size }
    }

    pub fn slots(&self) -> &[TensorSpec] {
        &self.slots
    }

    /// The amount of tensors.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The total amount of scalars across all slots.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Validates that `params` can be loaded into a model with this layout.
    ///
    /// Tensors are matched to slots by position; names are not compared.
    ///
    /// # Arguments
    /// * `params` - The parameter vector to check.
    ///
    /// # Returns
    /// A `TensorCountMismatch` or `ShapeMismatch` error on the first incompatibility.
    pub fn check(&self, params: &ParameterVector) -> Result<()> {
        if params.len() != self.len() {
            return Err(MlErr::TensorCountMismatch {
                got: params.len(),
                expected: self.len(),
            });
        }

        for (index, (slot, tensor)) in self.slots.iter().zip(params.iter()).enumerate() {
            if tensor.data.shape() != slot.shape.as_slice() {
                return Err(MlErr::ShapeMismatch {
                    index,
                    name: slot.name.clone(),
                    got: tensor.data.shape().to_vec(),
                    expected: slot.shape.clone(),
                });
            }
        }

        Ok(())
    }
}
