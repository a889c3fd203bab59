use std::time::Duration;

/// How many clients a round needs and how long it may take.
///
/// Every connected client takes part in every round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    /// Minimum successful `fit` results to aggregate a round.
    pub min_fit_clients: usize,
    /// Minimum successful `evaluate` results to aggregate the federated loss.
    pub min_evaluate_clients: usize,
    /// Minimum connected clients to start a round.
    pub min_available_clients: usize,
    /// Whether a round with failed clients may still be aggregated.
    pub accept_failures: bool,
    /// How long the coordinator waits for every client of a round.
    pub round_timeout: Duration,
}

impl StrategyConfig {
    pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(600);

    /// Creates a config requiring `min_clients` everywhere.
    pub fn with_min_clients(min_clients: usize) -> Self {
        Self {
            min_fit_clients: min_clients,
            min_evaluate_clients: min_clients,
            min_available_clients: min_clients,
            ..Default::default()
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_fit_clients: 1,
            min_evaluate_clients: 1,
            min_available_clients: 1,
            accept_failures: true,
            round_timeout: Self::DEFAULT_ROUND_TIMEOUT,
        }
    }
}

/// The coordinator process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub rounds: usize,
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rounds: 1,
            listen: "[::]:8080".into(),
        }
    }
}
