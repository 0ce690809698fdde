//! Client session state machine types.
//!
//! Transitions are driven by [`crate::client::ClientSession`]; this module
//! only names the states.
//!
//! ```text
//!  DISCONNECTED ──CONNECT ok──▶ CONNECTED ──DISTORT──▶ AWAITING_WORKER_REDIRECT
//!       ▲                          │  ▲                          │
//!       │          LOGOUT          │  └──── reply received ──────┘
//!       └──────────────────────────┘        (worker exchange runs on its own task)
//! ```

/// Where a client stands with respect to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    /// No coordinator connection; initial state.
    #[default]
    Disconnected,
    /// Logged in; commands may be sent.
    Connected,
    /// A `0x10` request is in flight, waiting for the redirect or a KO.
    AwaitingWorkerRedirect,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClientState::Disconnected => "disconnected",
            ClientState::Connected => "connected",
            ClientState::AwaitingWorkerRedirect => "awaiting worker redirect",
        };
        f.write_str(s)
    }
}
