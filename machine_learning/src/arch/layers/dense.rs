use comms::specs::round::TensorSpec;
use ndarray::{linalg, prelude::*};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer reading its weights and biases from a slice of the
/// model's flat parameter buffer.
///
/// The slice holds the `dim.0 × dim.1` weights in row-major order followed by the
/// `dim.1` biases.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
    a: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs of the layer.
    /// * `act_fn` - The activation applied to the outputs, if any.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            dim,
            act_fn,
            size: (dim.0 + 1) * dim.1,
            x: zeros.clone(),
            z: zeros.clone(),
            a: zeros,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// The parameter slots of this layer, weights first.
    ///
    /// # Arguments
    /// * `prefix` - The name of the layer inside the model.
    pub fn slots(&self, prefix: &str) -> [TensorSpec; 2] {
        [
            TensorSpec {
                name: format!("{prefix}.weight"),
                shape: vec![self.dim.0, self.dim.1],
            },
            TensorSpec {
                name: format!("{prefix}.bias"),
                shape: vec![self.dim.1],
            },
        ]
    }

    /// Computes the output of the layer for a batch, keeping what the backward pass needs.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `x` - The input batch, one sample per row.
    ///
    /// # Returns
    /// A view of the activated output, one row per sample.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<ArrayView2<'_, f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense layer input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let shape = (x.nrows(), self.dim.1);

        if self.z.dim() != shape {
            self.z = Array2::zeros(shape);
        }

        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut self.z);
        self.z += &b;

        self.x = x.to_owned();

        let Some(act_fn) = self.act_fn else {
            return Ok(self.z.view());
        };

        if self.a.dim() != shape {
            self.a = Array2::zeros(shape);
        }

        self.a.zip_mut_with(&self.z, |a, &z| *a = act_fn.f(z));
        Ok(self.a.view())
    }

    /// Backpropagates the delta of the last forward pass, writing this layer's gradient.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `grad` - This layer's slice of the gradient, overwritten.
    /// * `d` - The loss derivative with respect to this layer's output.
    ///
    /// # Returns
    /// The loss derivative with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if d.dim() != self.z.dim() {
            return Err(MlErr::SizeMismatch {
                what: "dense layer delta",
                got: d.len(),
                expected: self.z.len(),
            });
        }

        if let Some(act_fn) = self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &self.x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("layer gradient", grad.len())?;

        let (dw_raw, db_raw) = grad.split_at_mut(self.size - self.dim.1);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(|_| self.shape_err())?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).map_err(|_| self.shape_err())?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("layer parameters", params.len())?;

        let (w_raw, b_raw) = params.split_at(self.size - self.dim.1);
        let w = ArrayView2::from_shape(self.dim, w_raw).map_err(|_| self.shape_err())?;
        let b = ArrayView1::from_shape(self.dim.1, b_raw).map_err(|_| self.shape_err())?;
        Ok((w, b))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }

    fn shape_err(&self) -> MlErr {
        MlErr::SizeMismatch {
            what: "layer shape",
            got: self.size,
            expected: (self.dim.0 + 1) * self.dim.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_is_affine_then_activation() {
        let mut dense = Dense::new((2, 2), Some(ActFn::relu()));
        // w = [[1, -1], [2, 0]], b = [0.5, -3]
        let params = [1., -1., 2., 0., 0.5, -3.];
        let x = array![[1., 1.], [0., -1.]];

        let y = dense.forward(&params, x.view()).unwrap();
        assert_eq!(y, array![[3.5f32, 0.], [0., 0.]]);
    }

    #[test]
    fn backward_matches_finite_difference() {
        let mut dense = Dense::new((3, 2), Some(ActFn::tanh()));
        let params: Vec<f32> = (0..dense.size()).map(|i| 0.1 * i as f32 - 0.3).collect();
        let x = array![[0.2, -0.4, 0.9], [1.0, 0.3, -0.7]];

        // loss = sum(y)
        let loss = |dense: &mut Dense, params: &[f32]| dense.forward(params, x.view()).unwrap().sum();

        let y = dense.forward(&params, x.view()).unwrap().to_owned();
        let mut grad = vec![0.; dense.size()];
        dense
            .backward(&params, &mut grad, Array2::ones(y.dim()))
            .unwrap();

        let h = 1e-2;
        for i in 0..params.len() {
            let mut plus = params.clone();
            plus[i] += h;
            let mut minus = params.clone();
            minus[i] -= h;

            let numeric = (loss(&mut dense, &plus) - loss(&mut dense, &minus)) / (2. * h);
            assert!((numeric - grad[i]).abs() < 1e-2, "param {i}: {numeric} vs {}", grad[i]);
        }
    }

    #[test]
    fn rejects_wrong_sizes() {
        let mut dense = Dense::new((2, 2), None);
        let x = array![[1., 1.]];

        assert!(dense.forward(&[0.; 5], x.view()).is_err());
        assert!(dense.forward(&[0.; 6], array![[1., 1., 1.]].view()).is_err());
    }

    #[test]
    fn slots_name_weights_and_bias() {
        let dense = Dense::new((4, 3), None);
        let [w, b] = dense.slots("encoder.0");

        assert_eq!(w.name, "encoder.0.weight");
        assert_eq!(w.shape, [4, 3]);
        assert_eq!(b.name, "encoder.0.bias");
        assert_eq!(b.shape, [3]);
        assert_eq!(w.len() + b.len(), dense.size());
    }
}
