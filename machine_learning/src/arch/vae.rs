use std::{cell::RefCell, rc::Rc};

use comms::specs::round::TensorSpec;
use log::debug;
use ndarray::{Array2, ArrayD, ArrayView2, IxDyn};
use ndarray_rand::{RandomExt, rand_distr::StandardNormal};
use rand::{SeedableRng, rngs::StdRng};

use super::{
    activations::ActFn,
    layers::Dense,
    loss::{LossParts, VaeLoss},
};
use crate::{
    Device, MlErr, Result,
    initialization::{ChainedParamGen, ParamGen, RandParamGen, generate_rng},
    optimization::Optimizer,
    params::{BackIter, FrontIter, NamedTensor, ParamLayout, ParameterVector},
};

/// The sizes of a `Vae` and where it runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VaeConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub latent_size: usize,
    /// Seeds both the initial parameters and the reparameterization noise.
    pub seed: Option<u64>,
    pub device: Device,
}

/// The result of a forward pass.
#[derive(Debug, Clone)]
pub struct VaeOutput {
    pub reconstruction: Array2<f32>,
    pub mean: Array2<f32>,
    pub log_var: Array2<f32>,
}

/// A variational autoencoder made of dense layers:
///
/// ```text
/// x -> encoder.0 (relu) -> mean
///                       -> log_var -> z -> decoder.0 (relu) -> decoder.1 (tanh)
/// ```
///
/// Every parameter lives in one flat buffer laid out as its `ParamLayout` declares.
pub struct Vae {
    config: VaeConfig,
    layout: ParamLayout,
    params: Vec<f32>,
    grad: Vec<f32>,
    decoder_offset: usize,

    encoder: Dense,
    mean: Dense,
    log_var: Dense,
    decoder: Dense,
    output: Dense,

    rng: StdRng,
    // Reparameterization metadata
    eps: Array2<f32>,
    std: Array2<f32>,
}

impl Vae {
    /// Creates a new `Vae` with randomly initialized parameters.
    ///
    /// # Arguments
    /// * `config` - The sizes of the model.
    ///
    /// # Returns
    /// A `Config` error if any size is zero.
    pub fn new(config: VaeConfig) -> Result<Self> {
        let VaeConfig {
            input_size,
            hidden_size,
            latent_size,
            seed,
            device,
        } = config;

        if input_size == 0 || hidden_size == 0 || latent_size == 0 {
            return Err(MlErr::Config(format!(
                "every vae size must be positive, got input {input_size}, hidden {hidden_size} and latent {latent_size}"
            )));
        }

        let encoder = Dense::new((input_size, hidden_size), Some(ActFn::relu()));
        let mean = Dense::new((hidden_size, latent_size), None);
        let log_var = Dense::new((hidden_size, latent_size), None);
        let decoder = Dense::new((latent_size, hidden_size), Some(ActFn::relu()));
        let output = Dense::new((hidden_size, input_size), Some(ActFn::tanh()));

        let named = [
            ("encoder.0", &encoder),
            ("mean", &mean),
            ("log_var", &log_var),
            ("decoder.0", &decoder),
            ("decoder.1", &output),
        ];

        let slots: Vec<TensorSpec> = named
            .iter()
            .flat_map(|(name, layer)| layer.slots(name))
            .collect();
        let layout = ParamLayout::new(slots);

        let init_rng = Rc::new(RefCell::new(generate_rng(seed)));
        let mut param_gens: Vec<Box<dyn ParamGen>> = Vec::with_capacity(named.len());
        for (_, layer) in &named {
            let param_gen = RandParamGen::fan_in_uniform(init_rng.clone(), layer.size(), layer.dim().0)?;
            param_gens.push(Box::new(param_gen));
        }

        let size = layout.size();
        let params = ChainedParamGen::new(param_gens)
            .sample(size)
            .filter(|params| params.len() == size)
            .ok_or_else(|| MlErr::Init(format!("couldn't generate {size} parameters")))?;

        debug!(params = size, latent = latent_size; "created vae");

        Ok(Self {
            config,
            decoder_offset: encoder.size() + mean.size() + log_var.size(),
            grad: vec![0.; size],
            params,
            layout,
            encoder,
            mean,
            log_var,
            decoder,
            output,
            rng: generate_rng(seed.map(|s| s.wrapping_add(1))),
            eps: Array2::zeros((0, latent_size)),
            std: Array2::zeros((0, latent_size)),
        })
    }

    /// The parameter slots of this model, in declared order.
    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    /// The amount of scalar parameters.
    pub fn size(&self) -> usize {
        self.params.len()
    }

    /// Reseeds the reparameterization noise.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Returns a copy of every parameter tensor, in declared order.
    pub fn get_parameters(&self) -> Result<ParameterVector> {
        let mut tensors = Vec::with_capacity(self.layout.len());
        let mut front = FrontIter::new(&self.params);

        for slot in self.layout.slots() {
            let values = front.take(slot.len())?;
            let data = ArrayD::from_shape_vec(IxDyn(&slot.shape), values.to_vec()).map_err(|_| {
                MlErr::SizeMismatch {
                    what: "parameter slot",
                    got: values.len(),
                    expected: slot.len(),
                }
            })?;

            tensors.push(NamedTensor::new(slot.name.clone(), data));
        }

        Ok(ParameterVector::new(tensors))
    }

    /// Replaces every parameter of the model, matching tensors to slots by position.
    ///
    /// Nothing is written unless every tensor has the shape of its slot.
    ///
    /// # Arguments
    /// * `params` - The new parameters.
    ///
    /// # Returns
    /// A `TensorCountMismatch` or `ShapeMismatch` error if `params` don't fit the model.
    pub fn set_parameters(&mut self, params: &ParameterVector) -> Result<()> {
        self.layout.check(params)?;

        let mut rest = self.params.as_mut_slice();
        for tensor in params {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(tensor.data.len());
            head.iter_mut()
                .zip(tensor.data.iter())
                .for_each(|(p, &v)| *p = v);
            rest = tail;
        }

        Ok(())
    }

    /// Encodes a batch into the parameters of its latent distribution.
    ///
    /// # Arguments
    /// * `x` - The input batch, one flattened sample per row.
    ///
    /// # Returns
    /// The `(mean, log_var)` of every sample.
    pub fn encode(&mut self, x: ArrayView2<f32>) -> Result<(Array2<f32>, Array2<f32>)> {
        let mut front = FrontIter::new(&self.params);

        let h = self.encoder.forward(front.take(self.encoder.size())?, x)?;
        let mean = self.mean.forward(front.take(self.mean.size())?, h)?.to_owned();
        let log_var = self
            .log_var
            .forward(front.take(self.log_var.size())?, h)?
            .to_owned();

        Ok((mean, log_var))
    }

    /// Samples latent vectors as `mean + exp(log_var / 2) * eps` with `eps ~ N(0, 1)`.
    pub fn reparameterize(&mut self, mean: ArrayView2<f32>, log_var: ArrayView2<f32>) -> Array2<f32> {
        self.eps = Array2::random_using(mean.raw_dim(), StandardNormal, &mut self.rng);
        self.std = log_var.mapv(|lv| (0.5 * lv).exp());

        &mean + &(&self.std * &self.eps)
    }

    /// Decodes latent vectors into flattened images in `[-1, 1]`.
    pub fn decode(&mut self, z: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut front = FrontIter::new(&self.params[self.decoder_offset..]);

        let h = self.decoder.forward(front.take(self.decoder.size())?, z)?;
        let reconstruction = self.output.forward(front.take(self.output.size())?, h)?;
        Ok(reconstruction.to_owned())
    }

    /// Encodes, samples and decodes a batch.
    pub fn forward(&mut self, x: ArrayView2<f32>) -> Result<VaeOutput> {
        let (mean, log_var) = self.encode(x)?;
        let z = self.reparameterize(mean.view(), log_var.view());
        let reconstruction = self.decode(z.view())?;

        Ok(VaeOutput {
            reconstruction,
            mean,
            log_var,
        })
    }

    /// Reconstructs a batch without updating the model.
    pub fn reconstruct(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        Ok(self.forward(x)?.reconstruction)
    }

    /// Generates `n` new samples by decoding latent vectors drawn from the prior.
    pub fn sample(&mut self, n: usize) -> Result<Array2<f32>> {
        let z = Array2::random_using((n, self.config.latent_size), StandardNormal, &mut self.rng);
        self.decode(z.view())
    }

    /// Performs one optimizer step per batch.
    ///
    /// # Arguments
    /// * `loss` - The objective to minimise.
    /// * `optimizer` - The optimizer that dictates how to update the parameters after each batch.
    /// * `batches` - The batches of data.
    ///
    /// # Returns
    /// The amount of optimizer steps taken.
    pub fn backprop<'a, O, I>(&mut self, loss: &VaeLoss, optimizer: &mut O, batches: I) -> Result<usize>
    where
        O: Optimizer,
        I: IntoIterator<Item = ArrayView2<'a, f32>>,
    {
        let mut steps = 0;

        for x in batches {
            self.step(loss, optimizer, x)?;
            steps += 1;
        }

        Ok(steps)
    }

    fn step<O: Optimizer>(&mut self, loss: &VaeLoss, optimizer: &mut O, x: ArrayView2<f32>) -> Result<LossParts> {
        self.config.device.zero(&mut self.grad);

        let out = self.forward(x)?;
        let parts = loss.loss(
            out.reconstruction.view(),
            x,
            out.mean.view(),
            out.log_var.view(),
        );

        let d_out = loss.reconstruction_prime(out.reconstruction.view(), x);
        let (kl_mean, kl_log_var) = loss.kl_prime(out.mean.view(), out.log_var.view());
        self.backward(d_out, kl_mean, kl_log_var)?;

        optimizer.update_params(&self.grad, &mut self.params)?;
        Ok(parts)
    }

    fn backward(&mut self, d_out: Array2<f32>, kl_mean: Array2<f32>, kl_log_var: Array2<f32>) -> Result<()> {
        let mut back = BackIter::new(&self.params, &mut self.grad)?;

        let (params, grad) = back.take(self.output.size())?;
        let d = self.output.backward(params, grad, d_out)?;

        let (params, grad) = back.take(self.decoder.size())?;
        let d_z = self.decoder.backward(params, grad, d)?;

        let d_log_var = (&d_z * &self.eps * &self.std) * 0.5f32 + &kl_log_var;
        let d_mean = d_z + &kl_mean;

        let (params, grad) = back.take(self.log_var.size())?;
        let d_h = self.log_var.backward(params, grad, d_log_var)?;

        let (params, grad) = back.take(self.mean.size())?;
        let d_h = d_h + self.mean.backward(params, grad, d_mean)?;

        let (params, grad) = back.take(self.encoder.size())?;
        self.encoder.backward(params, grad, d_h)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Axis;

    use super::*;
    use crate::{arch::loss::GaussianKl, dataset::synthetic, optimization::Adam};

    fn vae(seed: u64) -> Vae {
        Vae::new(VaeConfig {
            input_size: 16,
            hidden_size: 8,
            latent_size: 3,
            seed: Some(seed),
            device: Device::Sequential,
        })
        .unwrap()
    }

    #[test]
    fn layout_is_declared_once() {
        let vae = vae(0);
        let names: Vec<_> = vae.layout().slots().iter().map(|s| s.name.as_str()).collect();

        assert_eq!(
            names,
            [
                "encoder.0.weight",
                "encoder.0.bias",
                "mean.weight",
                "mean.bias",
                "log_var.weight",
                "log_var.bias",
                "decoder.0.weight",
                "decoder.0.bias",
                "decoder.1.weight",
                "decoder.1.bias",
            ]
        );
        assert_eq!(vae.layout().size(), vae.size());
        assert_eq!(vae.layout().slots()[0].shape, [16, 8]);
    }

    #[test]
    fn initial_parameters_are_bounded_by_fan_in() {
        let params = vae(1).get_parameters().unwrap();
        let encoder_limit = 1. / 16f32.sqrt();

        assert!(params.iter().next().unwrap().data.iter().all(|x| x.abs() <= encoder_limit));
    }

    #[test]
    fn set_then_get_roundtrips() {
        let source = vae(1).get_parameters().unwrap();
        let mut target = vae(2);
        assert_ne!(target.get_parameters().unwrap(), source);

        target.set_parameters(&source).unwrap();
        assert_eq!(target.get_parameters().unwrap(), source);
    }

    #[test]
    fn wrong_shape_is_rejected_without_partial_load() {
        let mut target = vae(2);
        let before = target.get_parameters().unwrap();

        let mut params = vae(1).get_parameters().unwrap();
        params.tensors_mut()[2].data = ArrayD::zeros(IxDyn(&[8, 4]));

        let err = target.set_parameters(&params).unwrap_err();
        assert!(matches!(err, MlErr::ShapeMismatch { index: 2, .. }));
        assert_eq!(target.get_parameters().unwrap(), before);
    }

    #[test]
    fn wrong_tensor_count_is_rejected() {
        let mut target = vae(2);
        let mut tensors = vae(1).get_parameters().unwrap().into_tensors();
        tensors.pop();

        let err = target.set_parameters(&ParameterVector::new(tensors)).unwrap_err();
        assert!(matches!(err, MlErr::TensorCountMismatch { got: 9, expected: 10 }));
    }

    #[test]
    fn output_shapes() {
        let mut vae = vae(3);
        let x = Array2::zeros((5, 16));

        let out = vae.forward(x.view()).unwrap();
        assert_eq!(out.reconstruction.dim(), (5, 16));
        assert_eq!(out.mean.dim(), (5, 3));
        assert_eq!(out.log_var.dim(), (5, 3));
        assert!(out.reconstruction.iter().all(|x| x.abs() <= 1.));

        assert_eq!(vae.sample(7).unwrap().dim(), (7, 16));
        assert!(vae.forward(Array2::zeros((2, 15)).view()).is_err());
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let x = Array2::ones((4, 16));
        let mut a = vae(4);
        let mut b = vae(4);

        a.set_seed(9);
        b.set_seed(9);
        assert_eq!(a.reconstruct(x.view()).unwrap(), b.reconstruct(x.view()).unwrap());
    }

    #[test]
    fn backprop_lowers_the_loss() {
        let data = synthetic(64, &[16], Some(0)).unwrap();
        let x = data.images();
        let loss = VaeLoss::new(0.05);
        let mut vae = vae(5);
        let mut adam = Adam::with_defaults(vae.size(), 0.01);

        let before = vae.step(&loss, &mut adam, x.view()).unwrap().total;
        let steps = vae
            .backprop(&loss, &mut adam, (0..100).map(|_| x.view()))
            .unwrap();
        vae.set_seed(0);
        let out = vae.forward(x.view()).unwrap();
        let after = loss
            .loss(out.reconstruction.view(), x.view(), out.mean.view(), out.log_var.view())
            .total;

        assert_eq!(steps, 100);
        assert!(after < before, "{after} >= {before}");
    }

    #[test]
    fn kl_falls_when_training_on_noise() {
        let data = synthetic(128, &[16], Some(1)).unwrap();
        let x = data.images();
        let loss = VaeLoss::new(1.);
        let mut vae = vae(6);

        // Start far from the prior: mean around 2 and variance around e^1.5.
        let mut params = vae.get_parameters().unwrap();
        params.tensors_mut()[3].data.fill(2.);
        params.tensors_mut()[5].data.fill(1.5);
        vae.set_parameters(&params).unwrap();

        let kl = |vae: &mut Vae| {
            let (mean, log_var) = vae.encode(x.view()).unwrap();
            GaussianKl.loss(mean.view(), log_var.view())
        };

        let mut adam = Adam::with_defaults(vae.size(), 0.001);
        let mut history = vec![kl(&mut vae)];
        for _ in 0..5 {
            vae.backprop(&loss, &mut adam, x.axis_chunks_iter(Axis(0), 32))
                .unwrap();
            history.push(kl(&mut vae));
        }

        assert!(
            history.windows(2).all(|w| w[1] < w[0]),
            "kl didn't fall: {history:?}"
        );
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let mut vae = vae(7);
        let x = synthetic(4, &[16], Some(2)).unwrap().images().to_owned();
        let loss = VaeLoss::new(0.5);

        let total = |vae: &mut Vae| {
            vae.set_seed(11);
            let out = vae.forward(x.view()).unwrap();
            loss.loss(out.reconstruction.view(), x.view(), out.mean.view(), out.log_var.view())
                .total
        };

        vae.set_seed(11);
        vae.config.device.zero(&mut vae.grad);
        let out = vae.forward(x.view()).unwrap();
        let d_out = loss.reconstruction_prime(out.reconstruction.view(), x.view());
        let (kl_mean, kl_log_var) = loss.kl_prime(out.mean.view(), out.log_var.view());
        vae.backward(d_out, kl_mean, kl_log_var).unwrap();
        let grad = vae.grad.clone();

        let h = 1e-2;
        // a few parameters of every layer
        for i in (0..vae.size()).step_by(37) {
            let original = vae.params[i];

            vae.params[i] = original + h;
            let plus = total(&mut vae);
            vae.params[i] = original - h;
            let minus = total(&mut vae);
            vae.params[i] = original;

            let numeric = (plus - minus) / (2. * h);
            assert!(
                (numeric - grad[i]).abs() < 5e-3 + 0.05 * grad[i].abs(),
                "param {i}: {numeric} vs {}",
                grad[i]
            );
        }
    }
}
