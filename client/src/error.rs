use std::{error::Error, fmt, io};

use machine_learning::MlErr;

use crate::ClientState;

/// The client module's result type.
pub type Result<T> = std::result::Result<T, ClientErr>;

/// Client runtime failures.
#[derive(Debug)]
pub enum ClientErr {
    /// A model, data or configuration failure, fatal for the current round only.
    Ml(MlErr),
    Io(io::Error),
    /// The coordinator sent a message out of protocol order.
    UnexpectedMessage {
        state: ClientState,
        got: &'static str,
    },
}

impl ClientErr {
    /// Whether the session can go on serving rounds after this error.
    pub fn is_round_failure(&self) -> bool {
        matches!(self, ClientErr::Ml(_))
    }
}

impl fmt::Display for ClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientErr::Ml(e) => write!(f, "{e}"),
            ClientErr::Io(e) => write!(f, "io error: {e}"),
            ClientErr::UnexpectedMessage { state, got } => {
                write!(f, "unexpected message while {state}: got {got}")
            }
        }
    }
}

impl Error for ClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientErr::Ml(e) => Some(e),
            ClientErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for ClientErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ClientErr> for io::Error {
    fn from(value: ClientErr) -> Self {
        match value {
            ClientErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
