use std::{error::Error, fmt, io};

use machine_learning::MlErr;

/// The coordinator module's result type.
pub type Result<T> = std::result::Result<T, CoordinatorErr>;

/// Coordinator runtime failures.
#[derive(Debug)]
pub enum CoordinatorErr {
    /// Fewer clients than the strategy requires are connected or responded.
    NotEnoughClients { needed: usize, available: usize },
    RoundFailed { round: usize, reason: String },
    /// A client didn't answer before the round's deadline.
    Timeout { round: usize },
    /// A client answered a request with `Msg::Err`.
    ClientFailure { client_id: String, msg: String },
    Aggregation(String),
    /// The run was asked to stop while waiting on a client.
    Interrupted,
    Ml(MlErr),
    Io(io::Error),
}

impl CoordinatorErr {
    /// Whether the client's stream is still in sync after this error, so it can
    /// take part in later rounds.
    pub fn keeps_client(&self) -> bool {
        matches!(
            self,
            CoordinatorErr::ClientFailure { .. } | CoordinatorErr::Interrupted | CoordinatorErr::Ml(_)
        )
    }
}

impl fmt::Display for CoordinatorErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorErr::NotEnoughClients { needed, available } => {
                write!(f, "not enough clients: needed {needed}, got {available}")
            }
            CoordinatorErr::RoundFailed { round, reason } => {
                write!(f, "round {round} failed: {reason}")
            }
            CoordinatorErr::Timeout { round } => write!(f, "timed out on round {round}"),
            CoordinatorErr::ClientFailure { client_id, msg } => {
                write!(f, "client {client_id} failed: {msg}")
            }
            CoordinatorErr::Aggregation(msg) => write!(f, "aggregation failed: {msg}"),
            CoordinatorErr::Interrupted => f.write_str("interrupted"),
            CoordinatorErr::Ml(e) => write!(f, "{e}"),
            CoordinatorErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for CoordinatorErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CoordinatorErr::Ml(e) => Some(e),
            CoordinatorErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CoordinatorErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for CoordinatorErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}
