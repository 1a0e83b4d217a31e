use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use shellgate_types::{ClientMessage, ConnectRequest, Debouncer, ServerMessage, TerminalSize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, interval_at, sleep, timeout_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{ClientConfig, ClientError, ClientEvent, ConnectionState, CredentialSource, TransportStatus};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug)]
pub(crate) enum Command {
    Input(String),
    Resize(TerminalSize),
    Reconnect,
}

/// How one connection attempt ended
#[derive(Debug, PartialEq, Eq)]
enum Ended {
    /// `disconnect()` or every handle dropped
    Stopped,
    /// Socket trouble or timeout; try again after the retry delay
    Retry,
    /// Gateway error or process exit; wait for `reconnect()`
    Fatal,
}

pub(crate) struct Actor {
    config: ClientConfig,
    credential: Arc<dyn CredentialSource>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ClientEvent>,
    status: watch::Sender<TransportStatus>,
    /// Cancelled by `disconnect()`; once set, no retry or timer runs again
    suppress_retry: CancellationToken,
    /// Latest geometry the consumer asked for
    requested_size: TerminalSize,
    attempt: u32,
}

impl Actor {
    pub(crate) fn new(
        config: ClientConfig,
        credential: Arc<dyn CredentialSource>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<ClientEvent>,
        status: watch::Sender<TransportStatus>,
        suppress_retry: CancellationToken,
    ) -> Self {
        let requested_size = config.initial_size;
        Self {
            config,
            credential,
            commands,
            events,
            status,
            suppress_retry,
            requested_size,
            attempt: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let token = match self.wait_for_credential().await {
                Some(token) => token,
                None => break,
            };

            match self.connect_and_serve(&token).await {
                Ended::Stopped => break,
                Ended::Retry => {
                    if !self.wait_to_retry().await {
                        break;
                    }
                }
                Ended::Fatal => {
                    if !self.wait_for_reconnect().await {
                        break;
                    }
                }
            }
        }

        let error = self.status.borrow().error.clone();
        self.set_state(ConnectionState::Idle, error);
        debug!("transport stopped");
    }

    // Every select below polls the cancellation first, so once `disconnect()`
    // lands no timer or queued command can put anything on the wire.

    /// Idle until the credential source yields a token
    async fn wait_for_credential(&mut self) -> Option<String> {
        let mut poll = interval(self.config.credential_poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.suppress_retry.cancelled() => return None,
                _ = poll.tick() => {
                    if let Some(token) = self.credential.token().await {
                        return Some(token);
                    }
                    trace!("no credential yet, staying idle");
                }
                command = self.commands.recv() => {
                    if !self.handle_offline(command) {
                        return None;
                    }
                }
            }
        }
    }

    async fn wait_to_retry(&mut self) -> bool {
        let delay = self.config.retry_delay;
        let error = self.status.borrow().error.clone();
        self.set_state(ConnectionState::Idle, error);
        self.emit(ClientEvent::Retrying { delay });
        info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");

        let wake = sleep(delay);
        tokio::pin!(wake);
        loop {
            tokio::select! {
                biased;

                _ = self.suppress_retry.cancelled() => return false,
                _ = &mut wake => return true,
                command = self.commands.recv() => {
                    if !self.handle_offline(command) {
                        return false;
                    }
                }
            }
        }
    }

    async fn wait_for_reconnect(&mut self) -> bool {
        loop {
            tokio::select! {
                biased;

                _ = self.suppress_retry.cancelled() => return false,
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => {
                        info!("reconnect requested");
                        self.attempt = 0;
                        return true;
                    }
                    other => {
                        if !self.handle_offline(other) {
                            return false;
                        }
                    }
                },
            }
        }
    }

    /// Commands that arrive without a live socket. False once every handle is gone.
    fn handle_offline(&mut self, command: Option<Command>) -> bool {
        match command {
            Some(Command::Input(data)) => {
                debug!(bytes = data.len(), "not connected, dropping input");
            }
            Some(Command::Resize(size)) => self.requested_size = size,
            Some(Command::Reconnect) => {}
            None => {
                self.suppress_retry.cancel();
                return false;
            }
        }
        true
    }

    async fn connect_and_serve(&mut self, token: &str) -> Ended {
        self.attempt += 1;
        self.set_state(ConnectionState::Connecting, None);
        self.emit(ClientEvent::Connecting {
            attempt: self.attempt,
        });

        let url = match self.config.connect_url(token) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cannot connect");
                return self.fail(e.to_string());
            }
        };

        let request = ConnectRequest {
            cols: self.requested_size.cols,
            rows: self.requested_size.rows,
            cwd: self.config.cwd.clone(),
        };
        let sent_size = request.size();
        let deadline = Instant::now() + self.config.connect_timeout;
        let opening = timeout_at(deadline, handshake(url.to_string(), request));
        tokio::pin!(opening);

        let ws = loop {
            tokio::select! {
                biased;

                _ = self.suppress_retry.cancelled() => return Ended::Stopped,
                result = &mut opening => match result {
                    Ok(Ok(ws)) => break ws,
                    Err(_) => {
                        // Dropping the handshake future closes whatever socket it had opened
                        warn!(timeout_ms = self.config.connect_timeout.as_millis() as u64, "connection timed out");
                        self.set_state(ConnectionState::Error, Some("Connection timeout".into()));
                        self.emit(ClientEvent::TimedOut);
                        return Ended::Retry;
                    }
                    Ok(Err(ClientError::Rejected(message))) => {
                        warn!(%message, "gateway rejected connection");
                        return self.fail(message);
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "failed to connect to gateway");
                        let error = Some(e.to_string());
                        self.set_state(ConnectionState::Error, error);
                        self.emit(ClientEvent::Disconnected);
                        return Ended::Retry;
                    }
                },
                command = self.commands.recv() => {
                    if !self.handle_offline(command) {
                        return Ended::Stopped;
                    }
                }
            }
        };

        info!(attempt = self.attempt, size = %sent_size, "terminal connected");
        self.set_state(ConnectionState::Connected, None);
        self.emit(ClientEvent::Connected);

        let (sink, source) = ws.split();
        self.serve(sink, source, sent_size).await
    }

    async fn serve(&mut self, mut sink: WsSink, mut source: WsSource, mut last_sent: TerminalSize) -> Ended {
        let mut resize = Debouncer::new(self.config.resize_debounce);
        if self.requested_size != last_sent {
            resize.schedule(self.requested_size);
        }

        let period = self.config.ping_interval;
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_pong: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                _ = self.suppress_retry.cancelled() => {
                    self.set_state(ConnectionState::Closing, None);
                    let _ = sink.close().await;
                    self.emit(ClientEvent::Disconnected);
                    return Ended::Stopped;
                }

                _ = ping.tick() => {
                    trace!(last_pong = ?last_pong.map(|at| at.elapsed()), "sending keepalive");
                    if let Err(e) = send(&mut sink, &ClientMessage::Ping).await {
                        return self.lost(e);
                    }
                }

                size = resize.fired() => {
                    if size != last_sent {
                        debug!(cols = size.cols, rows = size.rows, "sending resize");
                        if let Err(e) = send(&mut sink, &ClientMessage::Resize { data: size }).await {
                            return self.lost(e);
                        }
                        last_sent = size;
                    }
                }

                command = self.commands.recv() => match command {
                    Some(Command::Input(data)) => {
                        if let Err(e) = send(&mut sink, &ClientMessage::Input { data }).await {
                            return self.lost(e);
                        }
                    }
                    Some(Command::Resize(size)) => {
                        self.requested_size = size;
                        resize.schedule(size);
                    }
                    Some(Command::Reconnect) => {}
                    None => {
                        self.suppress_retry.cancel();
                        let _ = sink.close().await;
                        return Ended::Stopped;
                    }
                },

                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => match ServerMessage::parse(&text) {
                        Ok(ServerMessage::Output { data }) => self.emit(ClientEvent::Output(data)),
                        Ok(ServerMessage::Pong) => last_pong = Some(Instant::now()),
                        Ok(ServerMessage::Error { message }) => {
                            warn!(%message, "gateway reported an error");
                            let _ = sink.close().await;
                            return self.fail(message);
                        }
                        Ok(ServerMessage::Exit { exit_code }) => {
                            info!(exit_code, "terminal process exited");
                            self.set_state(ConnectionState::Error, None);
                            self.emit(ClientEvent::Exited(exit_code));
                            return Ended::Fatal;
                        }
                        Ok(ServerMessage::Connected) | Ok(ServerMessage::Unknown) => {}
                        Err(e) => warn!(error = %e, "ignoring malformed gateway message"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("gateway closed the connection");
                        self.set_state(ConnectionState::Idle, None);
                        self.emit(ClientEvent::Disconnected);
                        return Ended::Retry;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return self.lost(e.into()),
                },
            }
        }
    }

    /// Socket went away under us
    fn lost(&mut self, error: ClientError) -> Ended {
        warn!(error = %error, "connection lost");
        self.set_state(ConnectionState::Error, Some(error.to_string()));
        self.emit(ClientEvent::Disconnected);
        Ended::Retry
    }

    /// Terminal condition, surfaced and not retried
    fn fail(&mut self, message: String) -> Ended {
        self.set_state(ConnectionState::Error, Some(message.clone()));
        self.emit(ClientEvent::Error(message));
        Ended::Fatal
    }

    fn set_state(&self, state: ConnectionState, error: Option<String>) {
        self.status.send_replace(TransportStatus::with_state(state, error));
    }

    fn emit(&self, event: ClientEvent) {
        // The consumer may have stopped listening
        let _ = self.events.send(event);
    }
}

/// Open the socket, send `connect` and wait for `connected`
async fn handshake(url: String, request: ConnectRequest) -> Result<WsStream, ClientError> {
    let (mut ws, _) = connect_async(url.as_str()).await?;
    send_ws(&mut ws, &ClientMessage::Connect { data: request }).await?;

    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Text(text) => match ServerMessage::parse(&text) {
                Ok(ServerMessage::Connected) => return Ok(ws),
                Ok(ServerMessage::Error { message }) => return Err(ClientError::Rejected(message)),
                Ok(ServerMessage::Exit { exit_code }) => {
                    return Err(ClientError::Rejected(format!(
                        "Terminal exited with code {}",
                        exit_code
                    )))
                }
                Ok(other) => debug!(?other, "ignoring message before connected"),
                Err(e) => warn!(error = %e, "ignoring malformed gateway message"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(ClientError::Closed)
}

async fn send(sink: &mut WsSink, message: &ClientMessage) -> Result<(), ClientError> {
    sink.send(Message::Text(message.to_text()?)).await?;
    Ok(())
}

async fn send_ws(ws: &mut WsStream, message: &ClientMessage) -> Result<(), ClientError> {
    ws.send(Message::Text(message.to_text()?)).await?;
    Ok(())
}
