use std::fmt;

/// Where a client is within a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientState {
    /// Waiting for a request, also where a failed round leaves the client.
    #[default]
    Idle,
    /// The coordinator's parameters were applied to the model.
    Loaded,
    /// The last request was a completed `fit`.
    Trained,
    /// The last request was a completed `evaluate`.
    Evaluated,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Idle => "idle",
            ClientState::Loaded => "loaded",
            ClientState::Trained => "trained",
            ClientState::Evaluated => "evaluated",
        };
        f.write_str(name)
    }
}
