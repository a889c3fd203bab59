//! The federated side of VAE training: drives rounds over the connected clients and
//! combines their updates with federated averaging.

pub mod config;
pub mod connection;
pub mod error;
pub mod server;
pub mod strategy;

pub use config::{ServerConfig, StrategyConfig};
pub use connection::ClientProxy;
pub use error::{CoordinatorErr, Result};
pub use server::{RoundSummary, Server};
pub use strategy::{EvaluateOutcome, FedAvg, FitOutcome, Strategy};
