#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use shellgate_gateway::{Gateway, GatewayConfig, StaticToken};
use shellgate_terminal::{PtyError, PtyProcess, PtySpawner, SpawnRequest, SpawnedPty};
use shellgate_types::{ClientMessage, ConnectRequest, ServerMessage, TerminalSize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const TOKEN: &str = "test-token";
pub const WAIT: Duration = Duration::from_secs(5);

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the mock process has been asked to do
#[derive(Default)]
pub struct ProcessLog {
    pub requests: Vec<SpawnRequest>,
    pub inputs: Vec<String>,
    pub resizes: Vec<TerminalSize>,
    pub kills: usize,
    pub output: Option<mpsc::Sender<String>>,
    pub exit: Option<oneshot::Sender<i32>>,
}

/// Spawner whose processes echo their input back as output
#[derive(Clone, Default)]
pub struct MockSpawner {
    pub log: Arc<Mutex<ProcessLog>>,
    pub fail: bool,
}

impl MockSpawner {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn spawns(&self) -> usize {
        self.log.lock().unwrap().requests.len()
    }

    pub fn kills(&self) -> usize {
        self.log.lock().unwrap().kills
    }

    /// Emit output, then end the process with `code`
    pub async fn finish(&self, output: &str, code: i32) {
        let tx = self.log.lock().unwrap().output.clone().expect("no process");
        tx.send(output.to_string()).await.unwrap();
        let exit = self.log.lock().unwrap().exit.take().expect("no process");
        exit.send(code).unwrap();
    }
}

struct MockProcess {
    log: Arc<Mutex<ProcessLog>>,
    echo: mpsc::Sender<String>,
}

impl PtyProcess for MockProcess {
    fn write_input(&mut self, data: &str) -> Result<(), PtyError> {
        self.log.lock().unwrap().inputs.push(data.to_string());
        self.echo
            .try_send(data.to_string())
            .map_err(|_| PtyError::InputClosed)
    }

    fn resize(&mut self, size: TerminalSize) -> Result<(), PtyError> {
        self.log.lock().unwrap().resizes.push(size);
        Ok(())
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        self.log.lock().unwrap().kills += 1;
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        Some(4242)
    }
}

impl PtySpawner for MockSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedPty, PtyError> {
        if self.fail {
            return Err(PtyError::Open("no pty available".into()));
        }
        let (output_tx, output_rx) = mpsc::channel(16);
        let (exit_tx, exit_rx) = oneshot::channel();
        {
            let mut log = self.log.lock().unwrap();
            log.requests.push(request.clone());
            log.output = Some(output_tx.clone());
            log.exit = Some(exit_tx);
        }
        Ok(SpawnedPty {
            process: Box::new(MockProcess {
                log: self.log.clone(),
                echo: output_tx,
            }),
            output: output_rx,
            exit: exit_rx,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        default_cwd: std::env::temp_dir(),
        exit_drain: Duration::from_millis(50),
        ..GatewayConfig::default()
    }
}

pub async fn start_gateway(spawner: MockSpawner) -> Gateway {
    Gateway::bind_with(
        test_config(),
        Arc::new(spawner),
        Arc::new(StaticToken::new(TOKEN)),
    )
    .await
    .unwrap()
}

pub async fn open(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/?token={}", addr, TOKEN))
        .await
        .unwrap();
    ws
}

pub async fn send(ws: &mut Client, message: &ClientMessage) {
    ws.send(Message::Text(message.to_text().unwrap()))
        .await
        .unwrap();
}

pub fn connect_message(cols: u16, rows: u16) -> ClientMessage {
    ClientMessage::Connect {
        data: ConnectRequest {
            cols,
            rows,
            cwd: None,
        },
    }
}

/// Next protocol message, or `None` once the server has closed the socket
pub async fn recv(ws: &mut Client) -> Option<ServerMessage> {
    loop {
        match timeout(WAIT, ws.next()).await.expect("timed out waiting for server") {
            Some(Ok(Message::Text(text))) => return Some(ServerMessage::parse(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

pub async fn open_connected(addr: SocketAddr) -> Client {
    let mut ws = open(addr).await;
    send(&mut ws, &connect_message(80, 24)).await;
    assert_eq!(recv(&mut ws).await, Some(ServerMessage::Connected));
    ws
}

/// Poll until `check` holds or the wait budget runs out
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
