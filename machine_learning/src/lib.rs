//! The model side of federated VAE training: the model adapter, its exchangeable
//! parameters, local training and evaluation, and the datasets they run on.

pub mod arch;
mod config;
pub mod dataset;
mod device;
pub mod error;
pub mod initialization;
pub mod optimization;
pub mod params;
pub mod training;

pub use arch::{Vae, VaeConfig, VaeOutput};
pub use config::TrainingConfig;
pub use device::Device;
pub use error::{MlErr, Result};
pub use params::{NamedTensor, ParamLayout, ParameterVector};
