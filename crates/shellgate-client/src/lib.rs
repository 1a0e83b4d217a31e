//! Transport client for local terminal sessions
//!
//! One actor task per logical session owns the WebSocket to the gateway and
//! walks it through credential gating, handshake, keepalive, resize debounce
//! and retry. Consumers drive it through a cloneable [`TransportHandle`] and
//! read [`ClientEvent`]s off a channel.

mod actor;
pub mod config;
pub mod credential;
mod error;
mod handle;
pub mod state;

pub use config::ClientConfig;
pub use credential::{CredentialSource, SharedCredential, StaticCredential};
pub use error::ClientError;
pub use handle::{spawn, TransportHandle};
pub use state::{ClientEvent, ConnectionState, TransportStatus};
