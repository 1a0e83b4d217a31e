use axum::extract::ws::{Message as WsMessage, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use shellgate_terminal::shell::resolve_cwd;
use shellgate_terminal::{PtyProcess, SpawnRequest, SpawnedPty};
use shellgate_types::{ClientMessage, ConnectRequest, ServerMessage, TerminalSize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::routes::AppState;
use crate::GatewayError;

type WsSink = SplitSink<WebSocket, WsMessage>;
type WsStream = SplitStream<WebSocket>;

/// Snapshot of one live gateway connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub opened_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Set once the handshake has spawned a process
    pub pid: Option<u32>,
    pub size: Option<TerminalSize>,
}

/// Live connections, keyed by connection id
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    inner: Arc<RwLock<HashMap<Uuid, ConnectionInfo>>>,
}

impl ConnectionTable {
    async fn register(&self, id: Uuid) {
        let now = Utc::now();
        self.inner.write().await.insert(
            id,
            ConnectionInfo {
                id,
                opened_at: now,
                last_activity: now,
                pid: None,
                size: None,
            },
        );
    }

    async fn update(&self, id: Uuid, apply: impl FnOnce(&mut ConnectionInfo)) {
        if let Some(info) = self.inner.write().await.get_mut(&id) {
            info.last_activity = Utc::now();
            apply(info);
        }
    }

    async fn remove(&self, id: Uuid) {
        self.inner.write().await.remove(&id);
    }

    pub async fn list(&self) -> Vec<ConnectionInfo> {
        let mut connections: Vec<_> = self.inner.read().await.values().cloned().collect();
        connections.sort_by_key(|info| info.opened_at);
        connections
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// Why a connection ended
#[derive(Debug)]
enum Outcome {
    /// Handshake never completed
    Rejected,
    SocketClosed,
    ProcessExited(i32),
    Failed(GatewayError),
}

/// The connection's process. Killed at most once, and never after it exited.
struct PtyHolder {
    connection_id: Uuid,
    process: Box<dyn PtyProcess>,
    finished: bool,
}

impl PtyHolder {
    fn new(connection_id: Uuid, process: Box<dyn PtyProcess>) -> Self {
        Self {
            connection_id,
            process,
            finished: false,
        }
    }

    fn mark_exited(&mut self) {
        self.finished = true;
    }

    fn terminate(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        match self.process.kill() {
            Ok(()) => debug!(connection_id = %self.connection_id, "killed PTY process"),
            Err(e) => warn!(connection_id = %self.connection_id, error = %e, "failed to kill PTY process"),
        }
    }
}

impl Drop for PtyHolder {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Serve one upgraded socket until it or its process goes away
pub(crate) async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    state.connections.register(connection_id).await;
    info!(%connection_id, "terminal connection opened");

    let (mut sink, mut stream) = socket.split();
    let outcome = run_connection(connection_id, &mut sink, &mut stream, &state).await;

    state.connections.remove(connection_id).await;
    match outcome {
        Outcome::Failed(e) => warn!(%connection_id, error = %e, "terminal connection failed"),
        outcome => info!(%connection_id, ?outcome, "terminal connection closed"),
    }
}

async fn run_connection(
    connection_id: Uuid,
    sink: &mut WsSink,
    stream: &mut WsStream,
    state: &AppState,
) -> Outcome {
    let request = match await_connect(connection_id, sink, stream).await {
        Some(request) => request,
        None => return Outcome::Rejected,
    };

    let size = request.size();
    let spawn_request = SpawnRequest {
        size,
        cwd: resolve_cwd(request.cwd.as_deref(), &state.config.default_cwd),
    };
    let spawner = state.spawner.clone();
    let spawned = tokio::task::spawn_blocking(move || spawner.spawn(&spawn_request)).await;
    let SpawnedPty {
        process,
        mut output,
        mut exit,
    } = match spawned {
        Ok(Ok(spawned)) => spawned,
        Ok(Err(e)) => {
            error!(%connection_id, error = %e, "failed to start terminal process");
            reject(sink, format!("Failed to start terminal: {}", e)).await;
            return Outcome::Rejected;
        }
        Err(e) => {
            error!(%connection_id, error = %e, "terminal spawn task failed");
            reject(sink, "Failed to start terminal").await;
            return Outcome::Failed(e.into());
        }
    };

    // From here on the process dies with this function, whatever the exit path
    let mut pty = PtyHolder::new(connection_id, process);
    let pid = pty.process.pid();
    state
        .connections
        .update(connection_id, |info| {
            info.pid = pid;
            info.size = Some(size);
        })
        .await;
    info!(%connection_id, pid = ?pid, %size, "terminal process started");

    if let Err(e) = send(sink, &ServerMessage::Connected).await {
        return Outcome::Failed(e);
    }

    let mut output_open = true;
    loop {
        tokio::select! {
            // Output first so nothing queued is overtaken by the exit notice
            biased;

            chunk = output.recv(), if output_open => match chunk {
                Some(data) => {
                    if let Err(e) = send(sink, &ServerMessage::Output { data }).await {
                        debug!(%connection_id, error = %e, "dropping output, socket gone");
                        return Outcome::SocketClosed;
                    }
                }
                None => output_open = false,
            },

            code = &mut exit => {
                pty.mark_exited();
                let exit_code = code.unwrap_or(-1);

                // The reader thread may still hold the tail of the output
                while let Ok(Some(data)) = timeout(state.config.exit_drain, output.recv()).await {
                    if send(sink, &ServerMessage::Output { data }).await.is_err() {
                        return Outcome::ProcessExited(exit_code);
                    }
                }
                if send(sink, &ServerMessage::Exit { exit_code }).await.is_ok() {
                    let _ = sink.close().await;
                }
                return Outcome::ProcessExited(exit_code);
            }

            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    state.connections.update(connection_id, |_| {}).await;
                    if let Err(e) = handle_client_text(connection_id, &text, &mut pty, sink).await {
                        return Outcome::Failed(e);
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => return Outcome::SocketClosed,
                Some(Ok(WsMessage::Binary(_))) => {
                    debug!(%connection_id, "ignoring binary frame");
                }
                // Protocol-level ping/pong is answered by the socket itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%connection_id, error = %e, "socket error");
                    return Outcome::SocketClosed;
                }
            },
        }
    }
}

/// Wait for the opening `connect`. Resize before connect is dropped; anything
/// else gets an error and the socket is closed.
async fn await_connect(
    connection_id: Uuid,
    sink: &mut WsSink,
    stream: &mut WsStream,
) -> Option<ConnectRequest> {
    while let Some(incoming) = stream.next().await {
        let text = match incoming {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Binary(_)) => {
                reject(sink, "Expected connect message, got a binary frame").await;
                return None;
            }
            Ok(WsMessage::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                debug!(%connection_id, error = %e, "socket error before connect");
                return None;
            }
        };

        match ClientMessage::parse(&text) {
            Ok(ClientMessage::Connect { data }) if data.size().is_valid() => return Some(data),
            Ok(ClientMessage::Connect { data }) => {
                reject(sink, format!("Invalid terminal size {}", data.size())).await;
                return None;
            }
            Ok(ClientMessage::Resize { .. }) => {
                debug!(%connection_id, "ignoring resize before connect");
            }
            Ok(other) => {
                warn!(%connection_id, kind = other.kind(), "first message was not connect");
                reject(sink, format!("Expected connect message, got {}", other.kind())).await;
                return None;
            }
            Err(e) => {
                warn!(%connection_id, error = %e, "malformed connect message");
                reject(sink, format!("Malformed connect message: {}", e)).await;
                return None;
            }
        }
    }
    None
}

async fn handle_client_text(
    connection_id: Uuid,
    text: &str,
    pty: &mut PtyHolder,
    sink: &mut WsSink,
) -> Result<(), GatewayError> {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(%connection_id, error = %e, "ignoring malformed message");
            return Ok(());
        }
    };

    match message {
        ClientMessage::Input { data } => {
            if let Err(e) = pty.process.write_input(&data) {
                warn!(%connection_id, error = %e, "failed to write terminal input");
            }
        }
        ClientMessage::Resize { data } if data.is_valid() => {
            if let Err(e) = pty.process.resize(data) {
                warn!(%connection_id, error = %e, "failed to resize terminal");
            }
        }
        ClientMessage::Resize { data } => {
            debug!(%connection_id, size = %data, "ignoring degenerate resize");
        }
        ClientMessage::Ping => send(sink, &ServerMessage::Pong).await?,
        ClientMessage::Connect { .. } => {
            debug!(%connection_id, "ignoring repeated connect");
        }
        ClientMessage::Unknown => {
            debug!(%connection_id, "ignoring unknown message type");
        }
    }
    Ok(())
}

async fn send(sink: &mut WsSink, message: &ServerMessage) -> Result<(), GatewayError> {
    let text = message.to_text()?;
    sink.send(WsMessage::Text(text)).await?;
    Ok(())
}

/// Send a fatal error and close the socket
async fn reject(sink: &mut WsSink, message: impl Into<String>) {
    if send(sink, &ServerMessage::error(message)).await.is_ok() {
        let _ = sink.close().await;
    }
}
