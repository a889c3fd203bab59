use std::mem;

use crate::{MlErr, Result};

/// Yields consecutive slices of a flat parameter buffer, front to back, as the
/// layers of a model consume them during the forward pass.
pub struct FrontIter<'a> {
    params: &'a [f32],
}

impl<'a> FrontIter<'a> {
    pub fn new(params: &'a [f32]) -> Self {
        Self { params }
    }

    /// Takes the next `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The amount of parameters to take.
    ///
    /// # Returns
    /// A `SizeMismatch` error if less than `n` parameters remain.
    pub fn take(&mut self, n: usize) -> Result<&'a [f32]> {
        if n > self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "remaining parameters",
                got: self.params.len(),
                expected: n,
            });
        }

        let (head, tail) = self.params.split_at(n);
        self.params = tail;
        Ok(head)
    }
}

/// Yields slices of the parameter and gradient buffers back to front, as the
/// layers of a model consume them during the backward pass.
pub struct BackIter<'a> {
    params: &'a [f32],
    grad: &'a mut [f32],
}

impl<'a> BackIter<'a> {
    /// Creates a new `BackIter`.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - The model's gradient, of the same length as `params`.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the buffers differ in length.
    pub fn new(params: &'a [f32], grad: &'a mut [f32]) -> Result<Self> {
        if params.len() != grad.len() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: params.len(),
            });
        }

        Ok(Self { params, grad })
    }

    /// Takes the last `n` parameters together with their gradient.
    ///
    /// # Arguments
    /// * `n` - The amount of parameters to take.
    ///
    /// # Returns
    /// A `SizeMismatch` error if less than `n` parameters remain.
    pub fn take(&mut self, n: usize) -> Result<(&'a [f32], &'a mut [f32])> {
        let len = self.params.len();
        if n > len {
            return Err(MlErr::SizeMismatch {
                what: "remaining parameters",
                got: len,
                expected: n,
            });
        }

        let (params, params_tail) = self.params.split_at(len - n);
        let (grad, grad_tail) = mem::take(&mut self.grad).split_at_mut(len - n);

        self.params = params;
        self.grad = grad;
        Ok((params_tail, grad_tail))
    }
}
