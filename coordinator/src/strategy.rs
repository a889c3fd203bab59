use comms::specs::round::{Metrics, RoundConfig};
use log::debug;
use machine_learning::{NamedTensor, ParameterVector};
use ndarray::ArrayD;

use crate::{CoordinatorErr, Result, StrategyConfig};

/// A successful `fit` answer from one client.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub client_id: String,
    pub parameters: ParameterVector,
    pub num_examples: usize,
    pub metrics: Metrics,
}

/// A successful `evaluate` answer from one client.
#[derive(Debug, Clone)]
pub struct EvaluateOutcome {
    pub client_id: String,
    pub loss: f32,
    pub num_examples: usize,
    pub metrics: Metrics,
}

/// The federated policy: what clients are asked each round and how their answers
/// are combined.
pub trait Strategy {
    fn config(&self) -> &StrategyConfig;

    /// The configuration sent with every `fit` request of `round`.
    fn configure_fit(&self, round: usize) -> RoundConfig;

    /// The configuration sent with every `evaluate` request of `round`.
    fn configure_evaluate(&self, round: usize) -> RoundConfig;

    /// Combines the clients' updated parameters into the new global parameters.
    ///
    /// # Arguments
    /// * `round` - The round being aggregated.
    /// * `results` - The successful answers.
    /// * `failures` - The amount of clients that failed this round.
    fn aggregate_fit(
        &self,
        round: usize,
        results: &[FitOutcome],
        failures: usize,
    ) -> Result<ParameterVector>;

    /// Combines the clients' losses and metrics into the round's federated ones.
    fn aggregate_evaluate(
        &self,
        round: usize,
        results: &[EvaluateOutcome],
        failures: usize,
    ) -> Result<(f32, Metrics)>;
}

/// Federated averaging: every parameter is the mean of the clients' values weighted
/// by how many samples each trained on.
#[derive(Debug, Clone, Default)]
pub struct FedAvg {
    config: StrategyConfig,
    fit_config: RoundConfig,
    evaluate_config: RoundConfig,
}

impl FedAvg {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            fit_config: RoundConfig::new(),
            evaluate_config: RoundConfig::new(),
        }
    }

    /// Sets the configuration sent with every `fit` request.
    pub fn with_fit_config(mut self, config: RoundConfig) -> Self {
        self.fit_config = config;
        self
    }

    /// Sets the configuration sent with every `evaluate` request.
    pub fn with_evaluate_config(mut self, config: RoundConfig) -> Self {
        self.evaluate_config = config;
        self
    }

    fn check_results(&self, round: usize, ok: usize, failures: usize, needed: usize) -> Result<()> {
        if failures > 0 && !self.config.accept_failures {
            return Err(CoordinatorErr::RoundFailed {
                round,
                reason: format!("{failures} clients failed and failures aren't accepted"),
            });
        }

        if ok == 0 || ok < needed {
            return Err(CoordinatorErr::NotEnoughClients {
                needed: needed.max(1),
                available: ok,
            });
        }

        Ok(())
    }
}

impl Strategy for FedAvg {
    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn configure_fit(&self, _round: usize) -> RoundConfig {
        self.fit_config.clone()
    }

    fn configure_evaluate(&self, _round: usize) -> RoundConfig {
        self.evaluate_config.clone()
    }

    fn aggregate_fit(
        &self,
        round: usize,
        results: &[FitOutcome],
        failures: usize,
    ) -> Result<ParameterVector> {
        self.check_results(round, results.len(), failures, self.config.min_fit_clients)?;
        weighted_average(results)
    }

    fn aggregate_evaluate(
        &self,
        round: usize,
        results: &[EvaluateOutcome],
        failures: usize,
    ) -> Result<(f32, Metrics)> {
        self.check_results(round, results.len(), failures, self.config.min_evaluate_clients)?;

        let total = total_examples(results.iter().map(|res| res.num_examples))?;
        let loss: f32 = results
            .iter()
            .map(|res| res.loss * res.num_examples as f32 / total)
            .sum();

        let mut metrics = Metrics::new();
        let mut weights = Metrics::new();
        for res in results {
            let weight = res.num_examples as f32;
            for (name, value) in &res.metrics {
                *metrics.entry(name.clone()).or_default() += value * weight;
                *weights.entry(name.clone()).or_default() += weight;
            }
        }

        for (name, value) in metrics.iter_mut() {
            *value /= weights[name];
        }

        debug!(round = round, clients = results.len(), loss = loss; "aggregated evaluation");
        Ok((loss, metrics))
    }
}

/// Computes the sample-weighted mean of every tensor, position by position.
///
/// # Arguments
/// * `results` - The clients' answers, all with the same layout.
///
/// # Returns
/// The averaged parameters, or an `Aggregation` error if there are no results, no
/// samples or the layouts disagree.
pub fn weighted_average(results: &[FitOutcome]) -> Result<ParameterVector> {
    let Some(first) = results.first() else {
        return Err(CoordinatorErr::Aggregation("there are no results".into()));
    };

    let layout = first.parameters.layout();
    if let Some(other) = results[1..]
        .iter()
        .find(|res| res.parameters.layout() != layout)
    {
        return Err(CoordinatorErr::Aggregation(format!(
            "client {} sent parameters laid out differently than client {}",
            other.client_id, first.client_id
        )));
    }

    let total = total_examples(results.iter().map(|res| res.num_examples))?;

    let mut tensors: Vec<NamedTensor> = first
        .parameters
        .iter()
        .map(|t| NamedTensor::new(t.name.clone(), ArrayD::zeros(t.data.raw_dim())))
        .collect();

    for res in results {
        let weight = res.num_examples as f32 / total;
        for (acc, tensor) in tensors.iter_mut().zip(&res.parameters) {
            acc.data.scaled_add(weight, &tensor.data);
        }
    }

    Ok(ParameterVector::new(tensors))
}

fn total_examples(counts: impl Iterator<Item = usize>) -> Result<f32> {
    match counts.sum::<usize>() {
        0 => Err(CoordinatorErr::Aggregation(
            "the clients reported no examples".into(),
        )),
        total => Ok(total as f32),
    }
}

#[cfg(test)]
mod tests {
    use ndarray::IxDyn;

    use super::*;

    fn outcome(id: &str, value: f32, num_examples: usize) -> FitOutcome {
        let tensors = vec![
            NamedTensor::new("w", ArrayD::from_elem(IxDyn(&[2, 2]), value)),
            NamedTensor::new("b", ArrayD::from_elem(IxDyn(&[2]), -value)),
        ];

        FitOutcome {
            client_id: id.into(),
            parameters: ParameterVector::new(tensors),
            num_examples,
            metrics: Metrics::new(),
        }
    }

    fn eval(loss: f32, num_examples: usize, metric: f32) -> EvaluateOutcome {
        EvaluateOutcome {
            client_id: "c".into(),
            loss,
            num_examples,
            metrics: Metrics::from([("Testing recon loss".to_string(), metric)]),
        }
    }

    #[test]
    fn average_is_weighted_by_samples() {
        let results = [outcome("a", 1., 100), outcome("b", 3., 300)];

        let avg = weighted_average(&results).unwrap();

        let tensors: Vec<_> = avg.iter().collect();
        assert!(tensors[0].data.iter().all(|&v| v == 2.5));
        assert!(tensors[1].data.iter().all(|&v| v == -2.5));
        assert_eq!(avg.layout(), results[0].parameters.layout());
    }

    #[test]
    fn single_client_is_kept_as_is() {
        let results = [outcome("a", 0.75, 10)];
        let avg = weighted_average(&results).unwrap();
        assert_eq!(avg, results[0].parameters);
    }

    #[test]
    fn empty_results_are_rejected() {
        assert!(matches!(
            weighted_average(&[]),
            Err(CoordinatorErr::Aggregation(_))
        ));
    }

    #[test]
    fn zero_examples_are_rejected() {
        let results = [outcome("a", 1., 0), outcome("b", 3., 0)];
        assert!(matches!(
            weighted_average(&results),
            Err(CoordinatorErr::Aggregation(_))
        ));
    }

    #[test]
    fn mismatched_layouts_are_rejected() {
        let mut other = outcome("b", 3., 300);
        other.parameters.tensors_mut()[1].data = ArrayD::zeros(IxDyn(&[3]));

        let results = [outcome("a", 1., 100), other];
        assert!(matches!(
            weighted_average(&results),
            Err(CoordinatorErr::Aggregation(_))
        ));
    }

    #[test]
    fn too_few_fit_results_fail_the_round() {
        let strategy = FedAvg::new(StrategyConfig::with_min_clients(2));
        let results = [outcome("a", 1., 100)];

        assert!(matches!(
            strategy.aggregate_fit(1, &results, 1),
            Err(CoordinatorErr::NotEnoughClients {
                needed: 2,
                available: 1
            })
        ));
    }

    #[test]
    fn failures_can_be_refused() {
        let strategy = FedAvg::new(StrategyConfig {
            accept_failures: false,
            ..Default::default()
        });
        let results = [outcome("a", 1., 100)];

        assert!(strategy.aggregate_fit(1, &results, 0).is_ok());
        assert!(matches!(
            strategy.aggregate_fit(3, &results, 1),
            Err(CoordinatorErr::RoundFailed { round: 3, .. })
        ));
    }

    #[test]
    fn evaluation_loss_is_weighted_by_samples() {
        let strategy = FedAvg::default();
        let results = [eval(1., 100, 4.), eval(3., 300, 8.)];

        let (loss, metrics) = strategy.aggregate_evaluate(1, &results, 0).unwrap();

        assert_eq!(loss, 2.5);
        assert_eq!(metrics["Testing recon loss"], 7.);
    }

    #[test]
    fn round_config_is_forwarded() {
        let config = RoundConfig::new().with(
            RoundConfig::EPOCHS_OVERRIDE,
            comms::specs::round::ConfigValue::Int(2),
        );
        let strategy = FedAvg::default().with_fit_config(config.clone());

        assert_eq!(strategy.configure_fit(1), config);
        assert!(strategy.configure_evaluate(1).is_empty());
    }
}
