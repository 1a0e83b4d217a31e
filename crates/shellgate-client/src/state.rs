use std::time::Duration;

/// Where the transport is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Closing,
    /// Stopped on a gateway error or process exit; waits for `reconnect()`
    Error,
}

/// Observable status, published on a watch channel
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub connecting: bool,
    pub error: Option<String>,
}

impl TransportStatus {
    pub(crate) fn with_state(state: ConnectionState, error: Option<String>) -> Self {
        Self {
            state,
            connected: state == ConnectionState::Connected,
            connecting: state == ConnectionState::Connecting,
            error,
        }
    }
}

/// What happened on the transport, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connecting { attempt: u32 },
    Connected,
    Output(String),
    /// Error reported by the gateway. No automatic retry follows.
    Error(String),
    TimedOut,
    /// The shell exited. No automatic retry follows.
    Exited(i32),
    /// The socket closed
    Disconnected,
    Retrying { delay: Duration },
}
