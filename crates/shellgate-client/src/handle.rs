use std::sync::Arc;

use shellgate_types::{TerminalSize, TransportControl};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::actor::{Actor, Command};
use crate::{ClientConfig, ClientError, ClientEvent, CredentialSource, TransportStatus};

/// Start a transport for one logical session.
///
/// The actor runs until [`TransportHandle::disconnect`] is called or every
/// handle is dropped. The event receiver closes once it has stopped.
pub fn spawn(
    config: ClientConfig,
    credential: Arc<dyn CredentialSource>,
) -> (TransportHandle, mpsc::UnboundedReceiver<ClientEvent>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(TransportStatus::default());
    let cancel = CancellationToken::new();

    let actor = Actor::new(
        config,
        credential,
        command_rx,
        event_tx,
        status_tx,
        cancel.clone(),
    );
    tokio::spawn(actor.run());

    let handle = TransportHandle {
        commands: command_tx,
        cancel,
        status: status_rx,
    };
    (handle, event_rx)
}

/// Consumer side of a transport
#[derive(Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    status: watch::Receiver<TransportStatus>,
}

impl TransportHandle {
    /// Forward keystrokes. Dropped while not connected.
    pub fn send_input(&self, data: impl Into<String>) -> Result<(), ClientError> {
        self.command(Command::Input(data.into()))
    }

    /// Report the consumer's geometry; only positive sizes are accepted
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), ClientError> {
        let size = TerminalSize::new(cols, rows);
        if !size.is_valid() {
            return Ok(());
        }
        self.command(Command::Resize(size))
    }

    /// Start over after a gateway error or process exit
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.command(Command::Reconnect)
    }

    /// Close the socket and stop for good. Safe to call any number of times.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    pub fn is_disconnected(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn status(&self) -> TransportStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransportStatus> {
        self.status.clone()
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Stopped);
        }
        self.commands.send(command).map_err(|_| ClientError::Stopped)
    }
}

impl TransportControl for TransportHandle {
    fn disconnect(&self) {
        TransportHandle::disconnect(self);
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("status", &*self.status.borrow())
            .field("disconnected", &self.cancel.is_cancelled())
            .finish()
    }
}
