/// PTY backend abstraction
///
/// The gateway only talks to these traits, so tests can swap the native
/// implementation for one that records spawns and kills.
use shellgate_types::TerminalSize;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

use crate::PtyError;

/// Everything needed to start one interactive shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub size: TerminalSize,
    pub cwd: PathBuf,
}

/// A freshly spawned process and the streams coming out of it
pub struct SpawnedPty {
    pub process: Box<dyn PtyProcess>,
    /// Decoded output in production order; closes when the PTY reaches EOF
    pub output: mpsc::Receiver<String>,
    /// Resolves with the exit code once the child has been reaped
    pub exit: oneshot::Receiver<i32>,
}

impl std::fmt::Debug for SpawnedPty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedPty")
            .field("pid", &self.process.pid())
            .finish()
    }
}

/// Handle on a running PTY process. Owned by exactly one connection.
pub trait PtyProcess: Send {
    /// Queue raw input for the process; writes are applied in call order
    fn write_input(&mut self, data: &str) -> Result<(), PtyError>;

    fn resize(&mut self, size: TerminalSize) -> Result<(), PtyError>;

    fn kill(&mut self) -> Result<(), PtyError>;

    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Factory for PTY processes
pub trait PtySpawner: Send + Sync {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedPty, PtyError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
