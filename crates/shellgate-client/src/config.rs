use std::time::Duration;

use shellgate_types::{TerminalSize, DEFAULT_GATEWAY_PORT};
use url::Url;

use crate::ClientError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_RESIZE_DEBOUNCE: Duration = Duration::from_millis(140);
pub const DEFAULT_CREDENTIAL_POLL: Duration = Duration::from_secs(5);

/// Transport client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway WebSocket endpoint, without the token
    pub url: String,
    /// Working directory requested for the shell
    pub cwd: Option<String>,
    /// Geometry sent with `connect` until the consumer reports one
    pub initial_size: TerminalSize,
    /// Covers socket open plus the wait for `connected`
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub retry_delay: Duration,
    pub resize_debounce: Duration,
    pub credential_poll: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:{}/", DEFAULT_GATEWAY_PORT),
            cwd: None,
            initial_size: TerminalSize::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            resize_debounce: DEFAULT_RESIZE_DEBOUNCE,
            credential_poll: DEFAULT_CREDENTIAL_POLL,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Gateway URL carrying `token` as a URL-encoded query parameter
    pub fn connect_url(&self, token: &str) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.url)?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}
