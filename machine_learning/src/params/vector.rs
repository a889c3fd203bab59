use comms::specs::round::TensorSpec;
use ndarray::{ArrayD, IxDyn};

use crate::{MlErr, Result};

/// A single parameter tensor and the name of the slot it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
    pub name: String,
    pub data: ArrayD<f32>,
}

impl NamedTensor {
    pub fn new(name: impl Into<String>, data: ArrayD<f32>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn spec(&self) -> TensorSpec {
        TensorSpec {
            name: self.name.clone(),
            shape: self.data.shape().to_vec(),
        }
    }
}

/// An ordered sequence of parameter tensors, the unit exchanged between the
/// coordinator and its clients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterVector {
    tensors: Vec<NamedTensor>,
}

impl ParameterVector {
    pub fn new(tensors: Vec<NamedTensor>) -> Self {
        Self { tensors }
    }

    /// Rebuilds a parameter vector from its wire form.
    ///
    /// # Arguments
    /// * `layout` - The name and shape of every tensor, in order.
    /// * `flat` - The concatenation of every tensor's elements in row-major order.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `flat` isn't exactly as long as `layout` declares.
    pub fn from_flat(layout: &[TensorSpec], flat: &[f32]) -> Result<Self> {
        let expected = layout.iter().map(TensorSpec::len).sum();
        if flat.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "flat parameters",
                got: flat.len(),
                expected,
            });
        }

        let mut rest = flat;
        let mut tensors = Vec::with_capacity(layout.len());

        for spec in layout {
            let (head, tail) = rest.split_at(spec.len());
            rest = tail;

            let data = ArrayD::from_shape_vec(IxDyn(&spec.shape), head.to_vec()).map_err(|_| {
                MlErr::SizeMismatch {
                    what: "tensor",
                    got: head.len(),
                    expected: spec.len(),
                }
            })?;

            tensors.push(NamedTensor::new(spec.name.clone(), data));
        }

        Ok(Self { tensors })
    }

    /// Concatenates every tensor's elements in row-major order.
    pub fn to_flat(&self) -> Vec<f32> {
        let mut flat = Vec::with_capacity(self.num_scalars());
        for tensor in &self.tensors {
            flat.extend(tensor.data.iter().copied());
        }
        flat
    }

    /// The name and shape of every tensor, in order.
    pub fn layout(&self) -> Vec<TensorSpec> {
        self.tensors.iter().map(NamedTensor::spec).collect()
    }

    pub fn num_scalars(&self) -> usize {
        self.tensors.iter().map(|t| t.data.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NamedTensor> {
        self.tensors.iter()
    }

    pub fn tensors_mut(&mut self) -> &mut [NamedTensor] {
        &mut self.tensors
    }

    pub fn into_tensors(self) -> Vec<NamedTensor> {
        self.tensors
    }
}

impl<'a> IntoIterator for &'a ParameterVector {
    type Item = &'a NamedTensor;
    type IntoIter = std::slice::Iter<'a, NamedTensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn flat_form_keeps_order_and_shapes() {
        let params = ParameterVector::new(vec![
            NamedTensor::new("w", array![[1., 2.], [3., 4.]].into_dyn()),
            NamedTensor::new("b", array![5., 6.].into_dyn()),
        ]);

        let flat = params.to_flat();
        assert_eq!(flat, [1., 2., 3., 4., 5., 6.]);

        let rebuilt = ParameterVector::from_flat(&params.layout(), &flat).unwrap();
        assert_eq!(rebuilt, params);
    }

    #[test]
    fn flat_form_of_transposed_tensor_is_logical_order() {
        let params = ParameterVector::new(vec![NamedTensor::new(
            "w",
            array![[1., 2.], [3., 4.]].reversed_axes().into_dyn(),
        )]);

        assert_eq!(params.to_flat(), [1., 3., 2., 4.]);
    }

    #[test]
    fn from_flat_rejects_wrong_length() {
        let layout = vec![TensorSpec {
            name: "w".into(),
            shape: vec![2, 2],
        }];

        let err = ParameterVector::from_flat(&layout, &[1., 2., 3.]).unwrap_err();
        assert!(matches!(
            err,
            MlErr::SizeMismatch {
                got: 3,
                expected: 4,
                ..
            }
        ));
    }
}
