use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use shellgate_terminal::shell::home_dir;
use shellgate_terminal::ShellConfig;
use shellgate_types::DEFAULT_GATEWAY_PORT;

/// How long to keep forwarding output after the child has exited
pub const DEFAULT_EXIT_DRAIN: Duration = Duration::from_millis(200);

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub shell: ShellConfig,
    /// Used when `connect` carries no usable cwd
    pub default_cwd: PathBuf,
    /// Shared secret clients must present; `None` accepts everyone
    pub auth_token: Option<String>,
    pub exit_drain: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_GATEWAY_PORT),
            shell: ShellConfig::default(),
            default_cwd: home_dir(),
            auth_token: None,
            exit_drain: DEFAULT_EXIT_DRAIN,
        }
    }
}
