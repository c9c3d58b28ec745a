//! Local pty-backed sessions.
//!
//! Spawns a real shell behind a pseudoterminal on this machine. There is
//! no teacher crate for pty handling, so this backend reaches for
//! `portable-pty`, the crate the wider example pack uses for the same
//! job (see DESIGN.md).

use agent_core::BrokerError;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

const SCROLLBACK_CAP: usize = agent_core::MAX_OUTPUT_LENGTH;

struct Inner {
    #[allow(dead_code)] // keeps the pty master alive for the session's lifetime
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    buffer: Arc<Mutex<VecDeque<u8>>>,
}

/// A single local pty-backed shell.
pub struct LocalSession {
    inner: AsyncMutex<Inner>,
}

impl LocalSession {
    /// Spawn a fresh shell behind a pty.
    pub fn spawn() -> Result<Self, BrokerError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 50,
                cols: 200,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BrokerError::Other(e.into()))?;

        let mut cmd = CommandBuilder::new("/bin/bash");
        cmd.arg("--noprofile");
        cmd.arg("--norc");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BrokerError::Other(e.into()))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BrokerError::Other(e.into()))?;

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BrokerError::Other(e.into()))?;

        let buffer = Arc::new(Mutex::new(VecDeque::new()));
        let buffer_for_thread = Arc::clone(&buffer);

        std::thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut buf = buffer_for_thread.lock().unwrap();
                        buf.extend(&chunk[..n]);
                        while buf.len() > SCROLLBACK_CAP {
                            buf.pop_front();
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            inner: AsyncMutex::new(Inner {
                master: pair.master,
                writer,
                child,
                buffer,
            }),
        })
    }

    /// Write a command followed by a newline.
    pub async fn send(&self, text: &str) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().await;
        inner
            .writer
            .write_all(text.as_bytes())
            .and_then(|_| inner.writer.write_all(b"\n"))
            .map_err(|e| BrokerError::Other(Box::new(e)))
    }

    /// Write raw bytes to stdin without a trailing newline (used by
    /// `send_long_command`'s chunked path, and by raw stdin injection).
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().await;
        inner
            .writer
            .write_all(bytes)
            .map_err(|e| BrokerError::Other(Box::new(e)))
    }

    /// Snapshot the trailing slice of output accumulated so far.
    pub async fn output_tail(&self) -> Vec<u8> {
        let inner = self.inner.lock().await;
        inner.buffer.lock().unwrap().iter().copied().collect()
    }

    /// The OS pid of the shell process, for process-tree inspection.
    pub async fn pid(&self) -> Option<u32> {
        let inner = self.inner.lock().await;
        inner.child.process_id()
    }

    /// Whether the shell process itself is still alive.
    pub async fn is_alive(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.child.try_wait().ok().flatten().is_none()
    }

    /// Send `SIGKILL` to the shell process itself (not its descendants —
    /// callers use [`crate::process::descendants`] plus a `kill` command
    /// for that).
    pub async fn kill_shell(&self) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().await;
        inner.child.kill().map_err(|e| BrokerError::Other(Box::new(e)))
    }
}

/// Send a signal to an arbitrary pid via the `kill` binary, so the broker
/// doesn't need a libc/nix dependency just for this.
pub async fn signal_pid(pid: u32, sig: &str) -> std::io::Result<bool> {
    let status = tokio::process::Command::new("kill")
        .arg(sig)
        .arg(pid.to_string())
        .status()
        .await?;
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_echo() {
        let session = LocalSession::spawn().expect("spawn shell");
        session.send("echo hello_local_pty").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let tail = session.output_tail().await;
        let text = String::from_utf8_lossy(&tail);
        assert!(text.contains("hello_local_pty"));
    }

    #[tokio::test]
    async fn shell_pid_is_available() {
        let session = LocalSession::spawn().expect("spawn shell");
        assert!(session.pid().await.is_some());
    }
}
