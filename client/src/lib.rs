pub mod client;
pub mod error;
pub mod session;
mod state;

pub use client::{Client, EvaluateResult, FitResult};
pub use error::{ClientErr, Result};
pub use session::serve;
pub use state::ClientState;
