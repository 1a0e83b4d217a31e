//! Local terminal session gateway
//!
//! Accepts WebSocket connections, authenticates them, and gives each accepted
//! connection exactly one PTY process for its whole lifetime. The process dies
//! with the socket.

pub mod auth;
pub mod config;
mod connection;
mod error;
mod routes;
mod server;

pub use auth::{AllowAll, StaticToken, TokenVerifier};
pub use config::GatewayConfig;
pub use connection::{ConnectionInfo, ConnectionTable};
pub use error::GatewayError;
pub use server::Gateway;
