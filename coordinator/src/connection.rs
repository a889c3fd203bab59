use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
    specs::{
        client::ClientSpec,
        round::{EvaluateIns, FitIns, RoundConfig, TensorSpec},
    },
};
use log::debug;
use machine_learning::ParameterVector;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    CoordinatorErr, Result,
    strategy::{EvaluateOutcome, FitOutcome},
};

/// The coordinator's handle to one connected client, it issues one request at a
/// time and waits for its answer.
///
/// Requests and answers are split so that waiting can be abandoned without leaving
/// a half written frame on the stream.
pub struct ClientProxy<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    spec: ClientSpec,
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
    rx_buf: Vec<u32>,
}

impl<R, W> ClientProxy<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Waits for a freshly connected client to announce itself.
    ///
    /// # Arguments
    /// * `rx` - The receiving end of the communication.
    /// * `tx` - The sending end of the communication.
    ///
    /// # Returns
    /// A proxy to the client, or an error if the first message isn't a `Join`.
    pub async fn accept(mut rx: OnoReceiver<R>, tx: OnoSender<W>) -> Result<Self> {
        let mut rx_buf = Vec::new();

        let spec = match rx.recv_into(&mut rx_buf).await? {
            Msg::Control(Command::Join(spec)) => spec,
            msg => return Err(unexpected_message("a join", &msg)),
        };

        debug!(
            client_id = spec.client_id.as_str(),
            num_train = spec.num_train,
            num_test = spec.num_test;
            "client joined"
        );

        Ok(Self {
            spec,
            rx,
            tx,
            rx_buf,
        })
    }

    pub fn id(&self) -> &str {
        &self.spec.client_id
    }

    pub fn spec(&self) -> &ClientSpec {
        &self.spec
    }

    /// Asks the client for its current model parameters, `parameters` waits for them.
    pub async fn request_parameters(&mut self) -> Result<()> {
        self.tx.send(&Msg::Control(Command::GetParameters)).await?;
        Ok(())
    }

    /// Waits for the answer to `request_parameters`.
    pub async fn parameters(&mut self) -> Result<ParameterVector> {
        let layout = match self.rx.recv_into(&mut self.rx_buf).await? {
            Msg::Control(Command::Params(res)) => res.layout,
            msg => return Err(failure(&self.spec.client_id, "parameters", &msg)),
        };

        self.recv_params(&layout).await
    }

    /// Sends the global parameters to train on, `fit_result` waits for the updated ones.
    ///
    /// # Arguments
    /// * `params` - The global parameters.
    /// * `config` - The round configuration.
    pub async fn request_fit(&mut self, params: &ParameterVector, config: RoundConfig) -> Result<()> {
        let ins = FitIns {
            config,
            layout: params.layout(),
        };
        self.send_params(Command::Fit(ins), params).await
    }

    /// Waits for the answer to `request_fit`.
    ///
    /// # Returns
    /// The client's updated parameters, or a `ClientFailure` if it failed the round.
    pub async fn fit_result(&mut self) -> Result<FitOutcome> {
        let res = match self.rx.recv_into(&mut self.rx_buf).await? {
            Msg::Control(Command::FitRes(res)) => res,
            msg => return Err(failure(&self.spec.client_id, "a fit result", &msg)),
        };

        Ok(FitOutcome {
            client_id: self.spec.client_id.clone(),
            parameters: self.recv_params(&res.layout).await?,
            num_examples: res.num_examples,
            metrics: res.metrics,
        })
    }

    /// Sends the global parameters to evaluate, `evaluate_result` waits for the losses.
    ///
    /// # Arguments
    /// * `params` - The global parameters.
    /// * `config` - The round configuration.
    pub async fn request_evaluate(
        &mut self,
        params: &ParameterVector,
        config: RoundConfig,
    ) -> Result<()> {
        let ins = EvaluateIns {
            config,
            layout: params.layout(),
        };
        self.send_params(Command::Evaluate(ins), params).await
    }

    /// Waits for the answer to `request_evaluate`.
    ///
    /// # Returns
    /// The client's losses, or a `ClientFailure` if it failed the round.
    pub async fn evaluate_result(&mut self) -> Result<EvaluateOutcome> {
        match self.rx.recv_into(&mut self.rx_buf).await? {
            Msg::Control(Command::EvaluateRes(res)) => Ok(EvaluateOutcome {
                client_id: self.spec.client_id.clone(),
                loss: res.loss,
                num_examples: res.num_examples,
                metrics: res.metrics,
            }),
            msg => Err(failure(&self.spec.client_id, "an evaluate result", &msg)),
        }
    }

    /// Tells the client the run is over.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.tx.send(&Msg::Control(Command::Disconnect)).await?;
        Ok(())
    }

    async fn send_params(&mut self, header: Command, params: &ParameterVector) -> Result<()> {
        let flat = params.to_flat();
        self.tx.send(&Msg::Control(header)).await?;
        self.tx.send(&Msg::Data(Payload::Params(&flat))).await?;
        Ok(())
    }

    async fn recv_params(&mut self, layout: &[TensorSpec]) -> Result<ParameterVector> {
        match self.rx.recv_into(&mut self.rx_buf).await? {
            Msg::Data(Payload::Params(flat)) => Ok(ParameterVector::from_flat(layout, flat)?),
            msg => Err(unexpected_message("a params payload", &msg)),
        }
    }
}

/// Maps an answer other than `expected` into an error.
fn failure(client_id: &str, expected: &str, msg: &Msg<'_>) -> CoordinatorErr {
    match msg {
        Msg::Err(reason) => CoordinatorErr::ClientFailure {
            client_id: client_id.to_string(),
            msg: reason.to_string(),
        },
        msg => unexpected_message(expected, msg),
    }
}

fn unexpected_message(expected: &str, msg: &Msg<'_>) -> CoordinatorErr {
    CoordinatorErr::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("expected {expected}, got {}", msg.kind()),
    ))
}
