use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use log::info;
use machine_learning::{Device, TrainingConfig, dataset::DatasetSelector};
use tokio::{net::TcpStream, signal};

use client::Client;

/// Federated VAE training client.
#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Trains a VAE on local data under a federated coordinator", long_about = None)]
struct Args {
    /// Dataset to train on (fmnist, cifar10, gtsrb, synthetic)
    #[arg(long)]
    dataset: DatasetSelector,

    /// Class labels to keep, all of them if none given
    #[arg(long, num_args = 1..)]
    classes: Vec<u8>,

    /// Local epochs per round
    #[arg(long, default_value = "10")]
    epochs: NonZeroUsize,

    /// Size of the latent space
    #[arg(long, default_value = "10")]
    latent_size: NonZeroUsize,

    /// Directory holding the dataset files
    #[arg(long, value_name = "PATH", default_value = "data")]
    data_dir: PathBuf,

    /// Coordinator address
    #[arg(long, default_value = "[::]:8080")]
    server: String,

    /// Seeds initialization, sampling and shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Runs optimizer steps on the rayon pool
    #[arg(long)]
    parallel: bool,

    /// Identifier reported to the coordinator
    #[arg(long)]
    id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = TrainingConfig {
        epochs: args.epochs,
        latent_size: args.latent_size,
        seed: args.seed,
        device: if args.parallel {
            Device::Parallel
        } else {
            Device::Sequential
        },
        ..Default::default()
    };

    let (train, test) = machine_learning::dataset::load_partitions(
        args.dataset,
        &args.classes,
        &args.data_dir,
        args.seed,
    )
    .with_context(|| format!("loading {}", args.dataset))?;

    info!(
        train = train.len(),
        test = test.len();
        "loaded {} partitions for classes {:?}", args.dataset, args.classes
    );

    let client_id = args
        .id
        .unwrap_or_else(|| format!("{}-{}", args.dataset, std::process::id()));
    let mut client = Client::new(client_id, &config, train, test)?;

    let stream = TcpStream::connect(&args.server)
        .await
        .with_context(|| format!("connecting to {}", args.server))?;
    let (rx, tx) = stream.into_split();
    let (rx, tx) = comms::channel(rx, tx);
    info!("connected to coordinator at {}", args.server);

    tokio::select! {
        ret = client::serve(&mut client, rx, tx) => {
            ret?;
            info!("wrapping up, disconnecting...");
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
        }
    }

    Ok(())
}
