use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open PTY: {0}")]
    Open(String),

    #[error("Failed to spawn '{program}' in PTY: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Failed to resize PTY to {cols}x{rows}: {reason}")]
    Resize { cols: u16, rows: u16, reason: String },

    #[error("PTY input channel closed")]
    InputClosed,

    #[error("Failed to kill child process: {0}")]
    Kill(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
