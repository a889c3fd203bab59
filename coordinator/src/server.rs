use std::sync::Arc;

use comms::specs::round::Metrics;
use log::{info, warn};
use machine_learning::ParameterVector;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::watch,
    task::JoinSet,
    time::{Instant, timeout_at},
};

use crate::{
    CoordinatorErr, Result,
    connection::ClientProxy,
    strategy::Strategy,
};

/// What happened on one round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSummary {
    pub round: usize,
    /// Clients whose `fit` results were aggregated.
    pub fit_clients: usize,
    /// Clients that failed `fit`.
    pub failures: usize,
    /// Clients that failed `evaluate`.
    pub evaluate_failures: usize,
    /// Whether the global parameters were replaced this round.
    pub updated: bool,
    /// The sample-weighted federated loss, if evaluation could be aggregated.
    pub loss: Option<f32>,
    pub metrics: Metrics,
}

type Task<R, W, T> = JoinSet<(ClientProxy<R, W>, Result<T>)>;

/// Turns `true` once the run should stop.
type Stop = watch::Receiver<bool>;

/// Waits for `answer` unless the run is stopped first.
async fn until_stopped<T>(stop: &mut Stop, answer: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        res = answer => res,
        _ = stop.wait_for(|&stopped| stopped) => Err(CoordinatorErr::Interrupted),
    }
}

/// The round driver, it owns the global parameters and the connected clients.
pub struct Server<S, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    strategy: S,
    clients: Vec<ClientProxy<R, W>>,
    rounds: usize,
    parameters: Option<ParameterVector>,
}

impl<S, R, W> Server<S, R, W>
where
    S: Strategy,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a new `Server`.
    ///
    /// # Arguments
    /// * `strategy` - The federated policy.
    /// * `rounds` - The amount of rounds to run.
    pub fn new(strategy: S, rounds: usize) -> Self {
        Self {
            strategy,
            clients: Vec::new(),
            rounds,
            parameters: None,
        }
    }

    /// Sets the initial global parameters, otherwise they're requested from a client.
    pub fn with_parameters(mut self, parameters: ParameterVector) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Binds a joined client to this server.
    pub fn add_client(&mut self, client: ClientProxy<R, W>) {
        info!(client_id = client.id(); "client registered");
        self.clients.push(client);
    }

    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    /// The global parameters, once the run started.
    pub fn parameters(&self) -> Option<&ParameterVector> {
        self.parameters.as_ref()
    }

    /// Runs every round and disconnects the clients afterwards.
    ///
    /// # Returns
    /// The summary of every round, or a `NotEnoughClients` error if the connected
    /// clients drop below the strategy's minimum.
    pub async fn run(&mut self) -> Result<Vec<RoundSummary>> {
        self.run_until(std::future::pending()).await
    }

    /// Like `run`, but stops early once `shutdown` completes.
    ///
    /// Pending answers are abandoned, the rounds already finished are returned and
    /// every client still receives `Disconnect`.
    ///
    /// # Arguments
    /// * `shutdown` - Completes when the run should stop, e.g. on ctrl-c.
    pub async fn run_until<F: Future<Output = ()>>(
        &mut self,
        shutdown: F,
    ) -> Result<Vec<RoundSummary>> {
        let (stop_tx, stop_rx) = watch::channel(false);

        let res = {
            let rounds = self.run_rounds(stop_rx);
            tokio::pin!(rounds);

            tokio::select! {
                res = &mut rounds => res,
                _ = shutdown => {
                    info!("stopping the run");
                    stop_tx.send_replace(true);
                    rounds.await
                }
            }
        };

        self.disconnect_all().await;
        res
    }

    async fn run_rounds(&mut self, stop: Stop) -> Result<Vec<RoundSummary>> {
        self.check_available()?;

        let mut global = match self.parameters.take() {
            Some(parameters) => parameters,
            None => self.initial_parameters(stop.clone()).await?,
        };

        let mut history = Vec::with_capacity(self.rounds);

        for round in 1..=self.rounds {
            if *stop.borrow() {
                info!(round = round; "stopped before the round");
                break;
            }

            if let Err(e) = self.check_available() {
                self.parameters = Some(global);
                return Err(e);
            }

            let summary = self.run_round(round, &mut global, &stop).await;
            info!(
                round = round,
                fit_clients = summary.fit_clients,
                failures = summary.failures,
                updated = summary.updated;
                "round finished with loss {:?}", summary.loss
            );

            history.push(summary);
        }

        self.parameters = Some(global);
        Ok(history)
    }

    /// Fits every client on `global`, aggregates, then evaluates the result.
    async fn run_round(
        &mut self,
        round: usize,
        global: &mut ParameterVector,
        stop: &Stop,
    ) -> RoundSummary {
        let params = Arc::new(global.clone());
        let config = self.strategy.configure_fit(round);
        let deadline = Instant::now() + self.strategy.config().round_timeout;

        let mut tasks = JoinSet::new();
        for mut proxy in self.clients.drain(..) {
            let params = Arc::clone(&params);
            let config = config.clone();
            let mut stop = stop.clone();

            tasks.spawn(async move {
                let res = timeout_at(deadline, async {
                    proxy.request_fit(&params, config).await?;
                    until_stopped(&mut stop, proxy.fit_result()).await
                })
                .await
                .unwrap_or_else(|_| Err(CoordinatorErr::Timeout { round }));

                (proxy, res)
            });
        }

        let (fits, failures) = self.collect(round, "fit", tasks).await;

        let updated = match self.strategy.aggregate_fit(round, &fits, failures) {
            Ok(parameters) => {
                *global = parameters;
                true
            }
            Err(e) => {
                warn!(round = round; "keeping the global parameters: {e}");
                false
            }
        };

        let mut summary = RoundSummary {
            round,
            fit_clients: fits.len(),
            failures,
            evaluate_failures: 0,
            updated,
            loss: None,
            metrics: Metrics::new(),
        };

        if *stop.borrow() {
            return summary;
        }

        let params = Arc::new(global.clone());
        let config = self.strategy.configure_evaluate(round);
        let deadline = Instant::now() + self.strategy.config().round_timeout;

        let mut tasks = JoinSet::new();
        for mut proxy in self.clients.drain(..) {
            let params = Arc::clone(&params);
            let config = config.clone();
            let mut stop = stop.clone();

            tasks.spawn(async move {
                let res = timeout_at(deadline, async {
                    proxy.request_evaluate(&params, config).await?;
                    until_stopped(&mut stop, proxy.evaluate_result()).await
                })
                .await
                .unwrap_or_else(|_| Err(CoordinatorErr::Timeout { round }));

                (proxy, res)
            });
        }

        let (evals, evaluate_failures) = self.collect(round, "evaluate", tasks).await;
        summary.evaluate_failures = evaluate_failures;

        match self
            .strategy
            .aggregate_evaluate(round, &evals, evaluate_failures)
        {
            Ok((loss, metrics)) => {
                summary.loss = Some(loss);
                summary.metrics = metrics;
            }
            Err(e) => warn!(round = round; "no federated loss: {e}"),
        }

        summary
    }

    /// Waits on every client of a stage, the round barrier.
    ///
    /// Clients whose stream may be out of sync are dropped, the rest are kept
    /// for later rounds.
    ///
    /// # Returns
    /// The successful results and the amount of failed clients.
    async fn collect<T: 'static>(
        &mut self,
        round: usize,
        stage: &str,
        mut tasks: Task<R, W, T>,
    ) -> (Vec<T>, usize) {
        let mut results = Vec::with_capacity(tasks.len());
        let mut failures = 0;

        while let Some(joined) = tasks.join_next().await {
            let (proxy, res) = match joined {
                Ok(joined) => joined,
                Err(e) => {
                    warn!(round = round; "{stage} task aborted: {e}");
                    failures += 1;
                    continue;
                }
            };

            match res {
                Ok(res) => {
                    results.push(res);
                    self.clients.push(proxy);
                }
                Err(e) => {
                    failures += 1;
                    warn!(client_id = proxy.id(), round = round; "{stage} failed: {e}");

                    if e.keeps_client() {
                        self.clients.push(proxy);
                    } else {
                        warn!(client_id = proxy.id(); "dropping client");
                    }
                }
            }
        }

        (results, failures)
    }

    /// Requests the initial global parameters from the first client that answers.
    async fn initial_parameters(&mut self, mut stop: Stop) -> Result<ParameterVector> {
        let deadline = Instant::now() + self.strategy.config().round_timeout;

        while !self.clients.is_empty() {
            let proxy = &mut self.clients[0];

            let res = timeout_at(deadline, async {
                proxy.request_parameters().await?;
                until_stopped(&mut stop, proxy.parameters()).await
            })
            .await
            .unwrap_or_else(|_| Err(CoordinatorErr::Timeout { round: 0 }));

            let err = match res {
                Ok(parameters) => {
                    info!(client_id = proxy.id(); "using the client's initial parameters");
                    return Ok(parameters);
                }
                Err(e) => e,
            };

            warn!(client_id = proxy.id(); "failed to get the initial parameters: {err}");
            if err.keeps_client() {
                return Err(err);
            }

            self.clients.remove(0);
        }

        Err(CoordinatorErr::NotEnoughClients {
            needed: self.strategy.config().min_available_clients.max(1),
            available: 0,
        })
    }

    fn check_available(&self) -> Result<()> {
        let needed = self.strategy.config().min_available_clients;
        if self.clients.len() < needed.max(1) {
            return Err(CoordinatorErr::NotEnoughClients {
                needed: needed.max(1),
                available: self.clients.len(),
            });
        }

        Ok(())
    }

    async fn disconnect_all(&mut self) {
        for mut client in self.clients.drain(..) {
            if let Err(e) = client.disconnect().await {
                warn!(client_id = client.id(); "failed to disconnect: {e}");
            }
        }
    }
}
