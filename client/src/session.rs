use std::borrow::Cow;

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
    specs::round::{EvaluateIns, EvaluateRes, FitIns, FitRes, ParamsRes, TensorSpec},
};
use log::{debug, info, warn};
use machine_learning::ParameterVector;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Client, ClientErr, ClientState, Result};

/// Serves coordinator requests until it asks to disconnect.
///
/// Announces the client with a `Join` message first, then answers `GetParameters`,
/// `Fit` and `Evaluate` requests one at a time. A failed round is answered with
/// `Msg::Err` and the session goes on serving the next one.
///
/// # Arguments
/// * `client` - The client answering the requests.
/// * `rx` - Receiving end of the coordinator channel.
/// * `tx` - Sending end of the coordinator channel.
///
/// # Returns
/// `Ok(())` after a `Disconnect`, or an error on I/O failures and protocol violations.
pub async fn serve<R, W>(
    client: &mut Client,
    mut rx: OnoReceiver<R>,
    mut tx: OnoSender<W>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let client_id = client.id().to_string();
    tx.send(&Msg::Control(Command::Join(client.spec()))).await?;
    debug!(client_id = client_id.as_str(); "joined");

    let mut rx_buf: Vec<u32> = Vec::new();

    loop {
        let cmd = match rx.recv_into(&mut rx_buf).await? {
            Msg::Control(cmd) => cmd,
            msg => return Err(unexpected(client.state(), &msg)),
        };

        match cmd {
            Command::GetParameters => {
                debug!(client_id = client_id.as_str(); "sending parameters");

                let params = client.get_parameters()?;
                let header = Command::Params(ParamsRes {
                    layout: params.layout(),
                });
                send_params(&mut tx, header, &params).await?;
            }
            Command::Fit(FitIns { config, layout }) => {
                debug!(client_id = client_id.as_str(); "received fit request");

                let res = match recv_params(&mut rx, &mut rx_buf, &layout, client.state()).await {
                    Ok(params) => client.fit(&params, &config),
                    Err(e) => Err(e),
                };

                match res {
                    Ok(fit) => {
                        let header = Command::FitRes(FitRes {
                            num_examples: fit.num_examples,
                            metrics: fit.metrics,
                            layout: fit.parameters.layout(),
                        });
                        send_params(&mut tx, header, &fit.parameters).await?;
                    }
                    Err(e) => fail_round(client, &mut tx, e).await?,
                }
            }
            Command::Evaluate(EvaluateIns { config, layout }) => {
                debug!(client_id = client_id.as_str(); "received evaluate request");

                let res = match recv_params(&mut rx, &mut rx_buf, &layout, client.state()).await {
                    Ok(params) => client.evaluate(&params, &config),
                    Err(e) => Err(e),
                };

                match res {
                    Ok(eval) => {
                        let msg = Msg::Control(Command::EvaluateRes(EvaluateRes {
                            loss: eval.loss,
                            num_examples: eval.num_examples,
                            metrics: eval.metrics,
                        }));
                        tx.send(&msg).await?;
                    }
                    Err(e) => fail_round(client, &mut tx, e).await?,
                }
            }
            Command::Disconnect => {
                info!(client_id = client_id.as_str(); "coordinator disconnected");
                return Ok(());
            }
            cmd => return Err(unexpected(client.state(), &Msg::Control(cmd))),
        }
    }
}

/// Receives the parameters payload following a `Fit` or `Evaluate` request.
async fn recv_params<R: AsyncRead + Unpin>(
    rx: &mut OnoReceiver<R>,
    rx_buf: &mut Vec<u32>,
    layout: &[TensorSpec],
    state: ClientState,
) -> Result<ParameterVector> {
    match rx.recv_into(rx_buf).await? {
        Msg::Data(Payload::Params(flat)) => Ok(ParameterVector::from_flat(layout, flat)?),
        msg => Err(unexpected(state, &msg)),
    }
}

async fn send_params<W: AsyncWrite + Unpin>(
    tx: &mut OnoSender<W>,
    header: Command,
    params: &ParameterVector,
) -> Result<()> {
    let flat = params.to_flat();
    tx.send(&Msg::Control(header)).await?;
    tx.send(&Msg::Data(Payload::Params(&flat))).await?;
    Ok(())
}

/// Reports a round failure to the coordinator, or gives up the session if the
/// error isn't recoverable.
async fn fail_round<W: AsyncWrite + Unpin>(
    client: &mut Client,
    tx: &mut OnoSender<W>,
    err: ClientErr,
) -> Result<()> {
    if !err.is_round_failure() {
        return Err(err);
    }

    warn!(client_id = client.id(); "round failed: {err}");
    client.reset();

    let msg = Msg::Err(Cow::Owned(err.to_string()));
    tx.send(&msg).await?;
    Ok(())
}

fn unexpected(state: ClientState, msg: &Msg<'_>) -> ClientErr {
    ClientErr::UnexpectedMessage {
        state,
        got: msg.kind(),
    }
}
