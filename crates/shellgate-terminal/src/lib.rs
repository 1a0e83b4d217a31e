// Local PTY process support
//
// Spawns the interactive shell behind each gateway connection and turns the
// process byte streams into channels the gateway can select over.

pub mod backend;
mod decoder;
mod error;
mod pty_handler;
pub mod shell;

// Re-export public API
pub use backend::{PtyProcess, PtySpawner, SpawnRequest, SpawnedPty};
pub use decoder::Utf8Chunker;
pub use error::PtyError;
pub use pty_handler::NativePtySpawner;
pub use shell::ShellConfig;

// Constants
pub const READ_BUFFER_SIZE: usize = 4096;
/// Output chunks buffered before the reader thread blocks on a slow socket
pub const OUTPUT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_TERM: &str = "xterm-256color";
