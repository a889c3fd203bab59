use std::num::NonZeroUsize;

use comms::specs::{
    client::ClientSpec,
    round::{Metrics, RoundConfig},
};
use log::{debug, info};
use machine_learning::{
    MlErr, ParameterVector, TrainingConfig, Vae, VaeConfig,
    dataset::Partition,
    training::{EvaluationMetrics, Trainer},
};

use crate::{ClientState, Result};

pub const TRAIN_BACKPROP_LOSS: &str = "Training backprop loss";
pub const TEST_BACKPROP_LOSS: &str = "Testing backprop loss";
pub const TRAIN_RECON_LOSS: &str = "Training recon loss";
pub const TEST_RECON_LOSS: &str = "Testing recon loss";

/// The outcome of a `fit` request.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub parameters: ParameterVector,
    /// The size of the training partition.
    pub num_examples: usize,
    /// Always empty, the metrics computed while training are only logged.
    pub metrics: Metrics,
    /// The amount of optimizer steps taken, not sent to the coordinator.
    pub steps: usize,
}

/// The outcome of an `evaluate` request.
#[derive(Debug, Clone)]
pub struct EvaluateResult {
    /// The backprop loss over the testing partition.
    pub loss: f32,
    /// The size of the testing partition.
    pub num_examples: usize,
    pub metrics: Metrics,
}

/// A federated learning participant: a model and the two partitions it trains and
/// evaluates on, answering one coordinator request at a time.
pub struct Client {
    client_id: String,
    model: Vae,
    trainer: Trainer,
    train: Partition,
    test: Partition,
    epochs: NonZeroUsize,
    state: ClientState,
    last_completed: Option<ClientState>,
}

impl Client {
    /// Creates a new client with a freshly initialized model sized after its data.
    ///
    /// # Arguments
    /// * `client_id` - Identifier used for observability.
    /// * `config` - The training hyperparameters.
    /// * `train` - The training partition.
    /// * `test` - The testing partition.
    ///
    /// # Returns
    /// A `DataUnavailable` error if a partition is empty, or a `Config` error if the
    /// configuration is invalid or the partitions hold samples of different sizes.
    pub fn new(
        client_id: impl Into<String>,
        config: &TrainingConfig,
        train: Partition,
        test: Partition,
    ) -> Result<Self> {
        config.validate()?;

        if train.is_empty() || test.is_empty() {
            return Err(MlErr::DataUnavailable(format!(
                "a client needs samples to train and test on, got {} and {}",
                train.len(),
                test.len()
            ))
            .into());
        }

        if train.sample_size() != test.sample_size() {
            return Err(MlErr::Config(format!(
                "training samples hold {} values but testing samples {}",
                train.sample_size(),
                test.sample_size()
            ))
            .into());
        }

        let model = Vae::new(VaeConfig {
            input_size: train.sample_size(),
            hidden_size: config.hidden_size.get(),
            latent_size: config.latent_size.get(),
            seed: config.seed,
            device: config.device,
        })?;

        Ok(Self {
            client_id: client_id.into(),
            model,
            trainer: Trainer::new(config),
            train,
            test,
            epochs: config.epochs,
            state: ClientState::Idle,
            last_completed: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.client_id
    }

    /// The current state, `Idle` between requests.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The state the last request completed in, `None` if it failed.
    pub fn last_completed(&self) -> Option<ClientState> {
        self.last_completed
    }

    /// What this client announces to the coordinator when joining.
    pub fn spec(&self) -> ClientSpec {
        ClientSpec {
            client_id: self.client_id.clone(),
            num_train: self.train.len(),
            num_test: self.test.len(),
        }
    }

    /// Returns a snapshot of the model's parameters.
    pub fn get_parameters(&self) -> Result<ParameterVector> {
        Ok(self.model.get_parameters()?)
    }

    /// Loads `params` and trains on the local partition.
    ///
    /// # Arguments
    /// * `params` - The coordinator's global parameters.
    /// * `config` - The round configuration, its `epochs_override` replaces the
    ///   client's epochs for this call only.
    ///
    /// # Returns
    /// The updated parameters and the size of the training partition, or an error
    /// that fails the round and leaves the client idle.
    pub fn fit(&mut self, params: &ParameterVector, config: &RoundConfig) -> Result<FitResult> {
        let res = self.try_fit(params, config);
        self.finish(res, ClientState::Trained)
    }

    /// Loads `params` and computes the losses over both partitions.
    ///
    /// # Arguments
    /// * `params` - The coordinator's global parameters.
    /// * `config` - The round configuration, currently unused.
    ///
    /// # Returns
    /// The testing backprop loss, the size of the testing partition and the four
    /// training and testing losses, or an error that fails the round and leaves the
    /// client idle.
    pub fn evaluate(
        &mut self,
        params: &ParameterVector,
        config: &RoundConfig,
    ) -> Result<EvaluateResult> {
        let res = self.try_evaluate(params, config);
        self.finish(res, ClientState::Evaluated)
    }

    /// Returns the client to `Idle` after a round failed before reaching it.
    pub(crate) fn reset(&mut self) {
        self.state = ClientState::Idle;
        self.last_completed = None;
    }

    fn try_fit(&mut self, params: &ParameterVector, config: &RoundConfig) -> Result<FitResult> {
        self.load(params)?;

        let epochs = config.epochs_override().unwrap_or(self.epochs.get());
        info!(client_id = self.client_id.as_str(), epochs = epochs; "fitting");

        let steps = self.trainer.train(
            &mut self.model,
            &self.train,
            Some(&self.test),
            epochs,
            true,
        )?;

        Ok(FitResult {
            parameters: self.model.get_parameters()?,
            num_examples: self.train.len(),
            metrics: Metrics::new(),
            steps,
        })
    }

    fn try_evaluate(
        &mut self,
        params: &ParameterVector,
        _config: &RoundConfig,
    ) -> Result<EvaluateResult> {
        self.load(params)?;

        let evaluator = self.trainer.evaluator();
        let train = evaluator.evaluate(&mut self.model, &self.train)?;
        let test = evaluator.evaluate(&mut self.model, &self.test)?;

        info!(
            client_id = self.client_id.as_str(),
            loss = test.backprop_loss;
            "evaluated"
        );

        Ok(EvaluateResult {
            loss: test.backprop_loss,
            num_examples: self.test.len(),
            metrics: metrics(train, test),
        })
    }

    fn load(&mut self, params: &ParameterVector) -> Result<()> {
        self.model.set_parameters(params)?;
        self.state = ClientState::Loaded;

        debug!(client_id = self.client_id.as_str(); "loaded parameters");
        Ok(())
    }

    /// Closes the request's cycle, the client is back to `Idle` either way.
    fn finish<T>(&mut self, res: Result<T>, done: ClientState) -> Result<T> {
        self.last_completed = match res {
            Ok(_) => {
                self.state = done;
                debug!(client_id = self.client_id.as_str(); "{} -> {}", self.state, ClientState::Idle);
                Some(done)
            }
            Err(_) => None,
        };

        self.state = ClientState::Idle;
        res
    }
}

fn metrics(train: EvaluationMetrics, test: EvaluationMetrics) -> Metrics {
    Metrics::from([
        (TRAIN_BACKPROP_LOSS.to_string(), train.backprop_loss),
        (TEST_BACKPROP_LOSS.to_string(), test.backprop_loss),
        (TRAIN_RECON_LOSS.to_string(), train.reconstruction_loss),
        (TEST_RECON_LOSS.to_string(), test.reconstruction_loss),
    ])
}

#[cfg(test)]
mod tests {
    use comms::specs::round::ConfigValue;
    use machine_learning::dataset::synthetic;
    use ndarray::{ArrayD, IxDyn};

    use super::*;
    use crate::ClientErr;

    fn client(train_len: usize) -> Client {
        let config = TrainingConfig {
            epochs: NonZeroUsize::new(1).unwrap(),
            hidden_size: NonZeroUsize::new(12).unwrap(),
            seed: Some(0),
            ..Default::default()
        };

        let train = synthetic(train_len, &[1, 4, 4], Some(1)).unwrap().into();
        let test = synthetic(64, &[1, 4, 4], Some(2)).unwrap().into();
        Client::new("test", &config, train, test).unwrap()
    }

    #[test]
    fn fit_takes_one_step_per_batch() {
        let mut client = client(256);
        let params = client.get_parameters().unwrap();

        let res = client.fit(&params, &RoundConfig::new()).unwrap();

        assert_eq!(res.steps, 2);
        assert_eq!(res.num_examples, 256);
        assert!(res.metrics.is_empty());
        assert_eq!(res.parameters.layout(), params.layout());
        assert_ne!(res.parameters, params);
        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(client.last_completed(), Some(ClientState::Trained));
    }

    #[test]
    fn fit_keeps_the_training_partition_as_loaded() {
        let mut client = client(200);
        let params = client.get_parameters().unwrap();
        let config = RoundConfig::new().with(RoundConfig::EPOCHS_OVERRIDE, ConfigValue::Int(2));
        let before = client.train.clone();

        client.fit(&params, &config).unwrap();

        assert_eq!(client.train.labels(), before.labels());
        assert_eq!(client.train.images(), before.images());
    }

    #[test]
    fn epochs_override_applies_to_one_fit() {
        let mut client = client(256);
        let params = client.get_parameters().unwrap();
        let config = RoundConfig::new().with(RoundConfig::EPOCHS_OVERRIDE, ConfigValue::Int(3));

        assert_eq!(client.fit(&params, &config).unwrap().steps, 6);
        assert_eq!(client.fit(&params, &RoundConfig::new()).unwrap().steps, 2);
    }

    #[test]
    fn evaluate_reports_the_testing_loss() {
        let mut client = client(128);
        let params = client.get_parameters().unwrap();

        let res = client.evaluate(&params, &RoundConfig::new()).unwrap();

        assert_eq!(res.num_examples, 64);
        assert_eq!(res.metrics.len(), 4);
        assert_eq!(res.metrics[TEST_BACKPROP_LOSS], res.loss);
        assert!(res.metrics[TRAIN_RECON_LOSS] > 0.);
        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(client.last_completed(), Some(ClientState::Evaluated));
    }

    #[test]
    fn evaluate_leaves_the_weights_untouched() {
        let mut client = client(128);
        let params = client.get_parameters().unwrap();

        client.evaluate(&params, &RoundConfig::new()).unwrap();
        let first = client.get_parameters().unwrap().to_flat();
        client.evaluate(&params, &RoundConfig::new()).unwrap();
        let second = client.get_parameters().unwrap().to_flat();

        assert_eq!(first, params.to_flat());
        assert_eq!(first, second);
    }

    #[test]
    fn shape_mismatch_fails_the_round() {
        let mut client = client(128);
        let before = client.get_parameters().unwrap();

        let mut params = before.clone();
        params.tensors_mut()[1].data = ArrayD::zeros(IxDyn(&[3]));

        let err = client.fit(&params, &RoundConfig::new()).unwrap_err();
        assert!(matches!(err, ClientErr::Ml(ref e) if e.is_shape_mismatch()));
        assert!(err.is_round_failure());
        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(client.last_completed(), None);
        assert_eq!(client.get_parameters().unwrap(), before);

        // the next round is served normally
        assert!(client.evaluate(&before, &RoundConfig::new()).is_ok());
    }

    #[test]
    fn empty_partitions_are_rejected() {
        let config = TrainingConfig::default();
        let train: Partition = synthetic(8, &[4], Some(1)).unwrap().into();
        let empty = Partition::filter(&synthetic(8, &[4], Some(1)).unwrap(), &[42]);

        assert!(matches!(
            Client::new("empty", &config, train, empty),
            Err(ClientErr::Ml(MlErr::DataUnavailable(_)))
        ));
    }
}
