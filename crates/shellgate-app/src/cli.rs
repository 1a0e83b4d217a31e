use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// CLI arguments for shellgate
#[derive(Parser, Debug)]
#[command(name = "shellgate")]
#[command(about = "Local terminal sessions over WebSocket")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log filter (trace, debug, info, warn, error or a full RUST_LOG directive)
    #[arg(long, global = true, env = "SHELLGATE_LOG")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the local terminal gateway until Ctrl-C
    Serve(ServeArgs),
    /// Open a local terminal through a running gateway
    Connect(ConnectArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "SHELLGATE_BIND", default_value = "127.0.0.1:30003")]
    pub bind: SocketAddr,

    /// Token clients must present; without one every local client is accepted
    #[arg(long, env = "SHELLGATE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Shell to launch (default: $SHELL, bash, or powershell.exe on Windows)
    #[arg(long, env = "SHELLGATE_SHELL")]
    pub shell: Option<String>,

    /// Directory new shells start in when the client does not ask for one
    #[arg(long, env = "SHELLGATE_CWD")]
    pub cwd: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Gateway WebSocket URL
    #[arg(long, env = "SHELLGATE_URL", default_value = "ws://127.0.0.1:30003/")]
    pub url: String,

    #[arg(long, env = "SHELLGATE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Working directory for the remote shell
    #[arg(long, env = "SHELLGATE_CWD")]
    pub cwd: Option<String>,

    /// Where open tabs are kept between runs
    #[arg(long, env = "SHELLGATE_SESSION_DIR", default_value = "~/.shellgate/sessions")]
    pub session_dir: PathBuf,

    /// Key the tab set is stored under
    #[arg(long, env = "SHELLGATE_USER", default_value = "local")]
    pub user: String,
}
