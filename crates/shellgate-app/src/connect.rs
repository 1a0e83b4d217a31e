//! `shellgate connect`: drive one local terminal tab from this terminal

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::tty::IsTty;
use shellgate_client::{ClientConfig, ClientEvent, StaticCredential, TransportHandle};
use shellgate_registry::{FileSessionStore, NewTab, RegistryConfig, TabService, TabType};
use shellgate_terminal::Utf8Chunker;
use shellgate_types::{TerminalSize, TransportControl};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::cli::ConnectArgs;

/// Ctrl-] leaves the session without sending anything to the shell
const DETACH_KEY: u8 = 0x1d;

/// Sent when no `--token` is given. A gateway without a configured secret
/// accepts any token, but the client only connects once it holds one.
const ANONYMOUS_TOKEN: &str = "anonymous";

/// How long the final session save may hold up exit
const SAVE_GRACE: Duration = Duration::from_millis(500);

pub async fn run(args: ConnectArgs) -> Result<i32> {
    let store = FileSessionStore::new(&args.session_dir).with_context(|| {
        format!(
            "failed to open session directory {}",
            args.session_dir.display()
        )
    })?;
    let service = TabService::start(
        RegistryConfig {
            user: args.user.clone(),
            ..RegistryConfig::default()
        },
        Arc::new(store),
    )
    .await;
    let tab_id = service
        .lock()
        .await
        .add_tab(NewTab::new(TabType::LocalTerminal));

    let config = ClientConfig {
        cwd: args.cwd.clone(),
        initial_size: terminal_size(),
        ..ClientConfig::new(args.url.clone())
    };
    let token = args
        .token
        .clone()
        .filter(|token| !token.is_empty())
        .unwrap_or_else(|| ANONYMOUS_TOKEN.to_string());
    let credential = StaticCredential::new(token);
    let (handle, events) = shellgate_client::spawn(config, Arc::new(credential));
    let handle = Arc::new(handle);
    let control: Arc<dyn TransportControl> = handle.clone();
    service.lock().await.attach_transport(tab_id, &control)?;
    info!(tab_id, url = %args.url, "opening local terminal");

    let outcome = {
        let _raw = RawMode::enable()?;
        pump(&handle, events).await
    };

    // Closing the tab disconnects the transport
    service.lock().await.remove_tab(tab_id);
    match tokio::time::timeout(SAVE_GRACE, service.save_before_exit()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "session save task failed"),
        Err(_) => warn!("session save did not finish before exit"),
    }
    service.shutdown().await;
    outcome
}

/// Shuttle bytes between this terminal and the transport until the session ends.
/// Returns the exit code to leave with.
async fn pump(handle: &TransportHandle, mut events: UnboundedReceiver<ClientEvent>) -> Result<i32> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = std::io::stdout();
    let mut buf = [0u8; 4096];
    let mut chunker = Utf8Chunker::new();
    let mut resizes = ResizeWatcher::new()?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Output(data)) => {
                    stdout.write_all(data.as_bytes())?;
                    stdout.flush()?;
                }
                Some(ClientEvent::Exited(code)) => return Ok(code),
                Some(ClientEvent::Error(message)) => {
                    notice(&message);
                    return Ok(1);
                }
                Some(ClientEvent::Connected) => debug!("terminal connected"),
                Some(ClientEvent::Connecting { attempt }) if attempt > 1 => {
                    notice(&format!("reconnecting (attempt {})", attempt));
                }
                Some(ClientEvent::TimedOut) => notice("connection timed out"),
                Some(ClientEvent::Disconnected) => notice("connection lost"),
                Some(ClientEvent::Retrying { delay }) => debug!(?delay, "waiting to reconnect"),
                Some(ClientEvent::Connecting { .. }) => {}
                None => return Ok(1),
            },
            read = stdin.read(&mut buf) => {
                let n = read.context("failed to read from stdin")?;
                if n == 0 {
                    return Ok(0);
                }
                let (keys, detach) = split_detach(&buf[..n]);
                let text = chunker.push(keys);
                if !text.is_empty() {
                    handle.send_input(text)?;
                }
                if detach {
                    notice("detached");
                    return Ok(0);
                }
            }
            size = resizes.changed() => handle.resize(size.cols, size.rows)?,
        }
    }
}

/// Bytes to forward, and whether the detach key was pressed
fn split_detach(bytes: &[u8]) -> (&[u8], bool) {
    match bytes.iter().position(|&b| b == DETACH_KEY) {
        Some(pos) => (&bytes[..pos], true),
        None => (bytes, false),
    }
}

/// Status line that survives raw mode
fn notice(message: &str) {
    eprint!("\r\n[shellgate] {}\r\n", message);
}

fn terminal_size() -> TerminalSize {
    crossterm::terminal::size()
        .ok()
        .map(|(cols, rows)| TerminalSize::new(cols, rows))
        .filter(TerminalSize::is_valid)
        .unwrap_or_default()
}

/// Raw mode for as long as the guard lives. A no-op when stdin is not a terminal.
struct RawMode {
    active: bool,
}

impl RawMode {
    fn enable() -> Result<Self> {
        if !std::io::stdin().is_tty() {
            return Ok(Self { active: false });
        }
        crossterm::terminal::enable_raw_mode().context("failed to switch terminal to raw mode")?;
        Ok(Self { active: true })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if self.active {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

/// Reports geometry changes of this terminal
struct ResizeWatcher {
    #[cfg(unix)]
    signal: tokio::signal::unix::Signal,
    #[cfg(not(unix))]
    tick: tokio::time::Interval,
    last: TerminalSize,
}

impl ResizeWatcher {
    fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            signal: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change())
                .context("failed to listen for window size changes")?,
            #[cfg(not(unix))]
            tick: tokio::time::interval(Duration::from_millis(250)),
            last: terminal_size(),
        })
    }

    async fn changed(&mut self) -> TerminalSize {
        loop {
            #[cfg(unix)]
            if self.signal.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
            #[cfg(not(unix))]
            self.tick.tick().await;

            let size = terminal_size();
            if size != self.last {
                self.last = size;
                return size;
            }
        }
    }
}
