use serde::{Deserialize, Serialize};

/// Sent by a client right after connecting to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSpec {
    /// Identifier used for observability on the coordinator's side.
    pub client_id: String,
    /// Amount of samples in the client's training partition.
    pub num_train: usize,
    /// Amount of samples in the client's test partition.
    pub num_test: usize,
}
