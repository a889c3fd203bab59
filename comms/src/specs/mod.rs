pub mod client;
pub mod round;
