//! Core types shared by every shellgate crate
//!
//! This crate holds the wire protocol spoken between the transport client and
//! the session gateway, the terminal geometry type, and the small timer and
//! transport primitives that the gateway, client and tab registry build on.

pub mod debounce;
pub mod protocol;
pub mod transport;

pub use debounce::Debouncer;
pub use protocol::{ClientMessage, ConnectRequest, ProtocolError, ServerMessage, TerminalSize};
pub use transport::TransportControl;

// ============================================================================
// Constants
// ============================================================================

/// Port the local terminal gateway listens on by default
pub const DEFAULT_GATEWAY_PORT: u16 = 30003;

/// Geometry used when the consumer has not reported a size yet
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// Path the gateway also serves the WebSocket endpoint under when proxied
pub const GATEWAY_WS_PATH: &str = "/local/websocket/";
