use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use tokio::{net::TcpListener, signal};

use coordinator::{ClientProxy, FedAvg, Server, ServerConfig, StrategyConfig};

/// Federated VAE training coordinator.
#[derive(Parser)]
#[command(name = "coordinator")]
#[command(about = "Aggregates VAE updates from federated clients", long_about = None)]
struct Args {
    /// Clients to wait for, and to require on every round
    #[arg(long, default_value = "1")]
    min_clients: usize,

    /// Rounds to run
    #[arg(long, default_value = "1")]
    rounds: usize,

    /// Address to listen on
    #[arg(long, default_value = "[::]:8080")]
    listen: String,

    /// Seconds to wait for every client of a round
    #[arg(long, value_name = "SECS")]
    round_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let server_config = ServerConfig {
        rounds: args.rounds,
        listen: args.listen,
    };

    let mut strategy_config = StrategyConfig::with_min_clients(args.min_clients.max(1));
    if let Some(secs) = args.round_timeout {
        strategy_config.round_timeout = Duration::from_secs(secs);
    }

    let list = TcpListener::bind(&server_config.listen)
        .await
        .with_context(|| format!("binding {}", server_config.listen))?;
    info!("listening at {}", server_config.listen);

    let min_clients = strategy_config.min_available_clients;
    let mut server = Server::new(FedAvg::new(strategy_config), server_config.rounds);

    while server.num_clients() < min_clients {
        let (stream, addr) = list.accept().await?;
        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);

        match ClientProxy::accept(rx, tx).await {
            Ok(client) => {
                info!("client {} connected from {addr}", client.id());
                server.add_client(client);
            }
            Err(e) => warn!("rejected connection from {addr}: {e}"),
        }
    }

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received SIGTERM"),
            Err(e) => {
                warn!("not listening for ctrl-c: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    for summary in server.run_until(shutdown).await? {
        info!("round {}: loss {:?}, metrics {:?}", summary.round, summary.loss, summary.metrics);
    }
    info!("wrapping up");

    Ok(())
}
