use shellgate_types::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The gateway answered the handshake with an error message
    #[error("{0}")]
    Rejected(String),

    #[error("Connection closed before the terminal was ready")]
    Closed,

    #[error("Transport has been stopped")]
    Stopped,
}
