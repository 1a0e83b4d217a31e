use std::net::SocketAddr;

use shellgate_types::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    Socket(#[from] axum::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Gateway task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
