use anyhow::{Context, Result};
use shellgate_gateway::{Gateway, GatewayConfig};
use shellgate_terminal::ShellConfig;
use tracing::info;

use crate::cli::ServeArgs;

pub async fn run(args: ServeArgs) -> Result<()> {
    let defaults = GatewayConfig::default();
    let config = GatewayConfig {
        bind_addr: args.bind,
        shell: ShellConfig {
            program: args.shell,
            ..ShellConfig::default()
        },
        default_cwd: args.cwd.unwrap_or(defaults.default_cwd),
        auth_token: args.token.filter(|token| !token.is_empty()),
        ..defaults
    };

    let gateway = Gateway::bind(config)
        .await
        .context("failed to start terminal gateway")?;
    info!(addr = %gateway.local_addr(), "press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!(
        open_connections = gateway.active_connections().await,
        "shutting down gateway"
    );
    gateway.shutdown().await?;
    Ok(())
}
