use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc as std_mpsc;
use std::thread;

use portable_pty::{native_pty_system, ChildKiller, MasterPty, PtySize};
use shellgate_types::TerminalSize;
use tokio::sync::{mpsc, oneshot};

use crate::backend::{PtyProcess, PtySpawner, SpawnRequest, SpawnedPty};
use crate::decoder::Utf8Chunker;
use crate::shell::ShellConfig;
use crate::{PtyError, OUTPUT_CHANNEL_CAPACITY, READ_BUFFER_SIZE};

/// Spawns shells in OS pseudo-terminals
#[derive(Debug, Clone, Default)]
pub struct NativePtySpawner {
    shell: ShellConfig,
}

impl NativePtySpawner {
    pub fn new(shell: ShellConfig) -> Self {
        Self { shell }
    }

    pub fn shell(&self) -> &ShellConfig {
        &self.shell
    }
}

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl PtySpawner for NativePtySpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedPty, PtyError> {
        let program = self.shell.program();
        let pair = native_pty_system()
            .openpty(pty_size(request.size))
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut child = pair
            .slave
            .spawn_command(self.shell.command(&request.cwd))
            .map_err(|e| PtyError::Spawn {
                program: program.clone(),
                reason: e.to_string(),
            })?;
        // Only the child may hold the slave side, otherwise the reader never sees EOF
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Open(format!("failed to clone PTY reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Open(format!("failed to take PTY writer: {}", e)))?;

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || pump_output(reader, output_tx))?;

        let (input_tx, input_rx) = std_mpsc::channel::<String>();
        thread::Builder::new()
            .name("pty-writer".into())
            .spawn(move || pump_input(writer, input_rx))?;

        let (exit_tx, exit_rx) = oneshot::channel();
        thread::Builder::new()
            .name("pty-wait".into())
            .spawn(move || {
                let code = match child.wait() {
                    Ok(status) => status.exit_code() as i32,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to wait for PTY child");
                        -1
                    }
                };
                tracing::debug!(pid = ?pid, code, "PTY child exited");
                let _ = exit_tx.send(code);
            })?;

        tracing::debug!(
            program = %program,
            pid = ?pid,
            cwd = %request.cwd.display(),
            size = %request.size,
            "spawned PTY process"
        );

        Ok(SpawnedPty {
            process: Box::new(NativePty {
                master: pair.master,
                killer,
                input: input_tx,
                pid,
            }),
            output: output_rx,
            exit: exit_rx,
        })
    }

    fn name(&self) -> &str {
        "native"
    }
}

/// Running process in an OS pseudo-terminal
struct NativePty {
    master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    input: std_mpsc::Sender<String>,
    pid: Option<u32>,
}

impl PtyProcess for NativePty {
    fn write_input(&mut self, data: &str) -> Result<(), PtyError> {
        self.input
            .send(data.to_string())
            .map_err(|_| PtyError::InputClosed)
    }

    fn resize(&mut self, size: TerminalSize) -> Result<(), PtyError> {
        self.master
            .resize(pty_size(size))
            .map_err(|e| PtyError::Resize {
                cols: size.cols,
                rows: size.rows,
                reason: e.to_string(),
            })
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        self.killer.kill().map_err(PtyError::Kill)
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Reader thread: PTY bytes -> decoded chunks, until EOF or the receiver goes away
fn pump_output(mut reader: Box<dyn Read + Send>, output: mpsc::Sender<String>) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut chunker = Utf8Chunker::new();

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                let text = chunker.push(&buffer[..n]);
                // Blocks when the connection falls behind, pushing back on the child
                if !text.is_empty() && output.blocking_send(text).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // EIO once the child side is gone
            Err(e) => {
                tracing::trace!(error = %e, "PTY read finished");
                break;
            }
        }
    }

    let rest = chunker.finish();
    if !rest.is_empty() {
        let _ = output.blocking_send(rest);
    }
}

/// Writer thread: applies input in the order it was queued
fn pump_input(mut writer: Box<dyn Write + Send>, input: std_mpsc::Receiver<String>) {
    while let Ok(data) = input.recv() {
        if let Err(e) = writer.write_all(data.as_bytes()).and_then(|_| writer.flush()) {
            tracing::debug!(error = %e, "PTY write failed, stopping writer");
            break;
        }
    }
}
