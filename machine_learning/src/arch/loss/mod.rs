mod kl;
mod loss_fn;
mod mse;
mod vae_loss;

pub use kl::GaussianKl;
pub use loss_fn::LossFn;
pub use mse::Mse;
pub use vae_loss::{LossParts, VaeLoss};
