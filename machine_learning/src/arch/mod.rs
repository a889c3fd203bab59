pub mod activations;
pub mod layers;
pub mod loss;
mod vae;

pub use vae::{Vae, VaeConfig, VaeOutput};
