//! Launching, exit watching, and termination of server processes.

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use async_process::{Command, Stdio};
use futures::io::BufReader;
use futures::{AsyncBufReadExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

/// Notification that a managed process exited.
///
/// Delivered on the supervisor's exit channel by the watcher task that owns
/// the child handle. This is the sole path by which an unsolicited exit
/// reaches the state machine.
#[derive(Debug, Clone)]
pub struct ExitEvent {
    /// Id of the server whose process exited.
    pub id: String,
    /// Pid the process held.
    pub pid: u32,
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,
    /// Human-readable exit reason, recorded as the server's error message.
    pub reason: String,
}

/// Owns the OS-level start/stop of one server's process.
///
/// The spawned child is handed to a watcher task that awaits its exit and
/// reports an [`ExitEvent`]; the controller itself keeps only the pid and a
/// completion flag, so stopping works by signalling the pid directly.
pub struct ProcessController {
    /// Launch configuration.
    config: Arc<ServerConfig>,
    /// Pid of the live child, if one was spawned and not yet reaped.
    pid: Option<u32>,
    /// Set to `true` by the watcher task once the child has exited.
    exited_rx: Option<watch::Receiver<bool>>,
}

impl ProcessController {
    /// Create a controller for one server
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            pid: None,
            exited_rx: None,
        }
    }

    /// Whether a child is currently believed alive.
    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }

    /// Pid of the live child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Start the server process and return its pid.
    ///
    /// Fails with [`Error::Launch`] if a child is already held, the
    /// configured port is already bound, or the command cannot be spawned.
    /// Exit of the spawned process is reported on `exit_tx`.
    pub async fn start(&mut self, exit_tx: UnboundedSender<ExitEvent>) -> Result<u32> {
        if self.pid.is_some() {
            return Err(Error::Launch(format!(
                "Server '{}' already has a live process",
                self.config.id
            )));
        }

        // The server will bind this port itself; refuse the launch early if
        // something else already holds it.
        if let Err(e) = std::net::TcpListener::bind(("127.0.0.1", self.config.port)) {
            return Err(Error::Launch(format!(
                "Port {} for server '{}' is not available: {}",
                self.config.port, self.config.id, e
            )));
        }

        let mut command = Command::new(&self.config.command);
        command.args(&self.config.args);

        for (key, value) in &self.config.env {
            command.env(key, value);
        }

        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| Error::Launch(format!("Failed to start process: {}", e)))?;

        let pid = child.id();
        tracing::info!(server = %self.config.id, pid, "Process spawned");

        // Drain stderr so child diagnostics surface in the supervisor log.
        if let Some(stderr) = child.stderr.take() {
            let server_id = self.config.id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Some(line) = lines.next().await {
                    match line {
                        Ok(line) => tracing::debug!(server = %server_id, "stderr: {}", line),
                        Err(_) => break,
                    }
                }
            });
        }

        let (exited_tx, exited_rx) = watch::channel(false);
        self.exited_rx = Some(exited_rx);
        self.pid = Some(pid);

        let server_id = self.config.id.clone();
        tokio::spawn(async move {
            let (code, reason) = match child.status().await {
                Ok(status) => match status.code() {
                    Some(code) => (Some(code), format!("process exited with code {}", code)),
                    None => (None, "process terminated by signal".to_string()),
                },
                Err(e) => (None, format!("failed to await process exit: {}", e)),
            };
            tracing::debug!(server = %server_id, pid, reason = %reason, "Process exited");
            let _ = exited_tx.send(true);
            let _ = exit_tx.send(ExitEvent {
                id: server_id,
                pid,
                code,
                reason,
            });
        });

        Ok(pid)
    }

    /// Stop the server process.
    ///
    /// Sends a graceful termination signal and waits up to `grace_timeout`
    /// for the process to exit, then escalates to a forced kill. A process
    /// that has already exited is treated as success.
    pub async fn stop(&mut self, grace_timeout: Duration) -> Result<()> {
        let Some(pid) = self.pid.take() else {
            // Idempotent: nothing running is a successful stop.
            return Ok(());
        };
        let mut exited_rx = self.exited_rx.take();

        match signal_process(pid, false) {
            Ok(()) => {}
            Err(SignalError::Gone) => {
                tracing::debug!(server = %self.config.id, pid, "Process already gone on stop");
                return Ok(());
            }
            Err(SignalError::Failed(msg)) => {
                // Leave the handle cleared; the watcher will still report
                // the eventual exit.
                return Err(Error::Stop(format!(
                    "Failed to signal process {} for server '{}': {}",
                    pid, self.config.id, msg
                )));
            }
        }

        if Self::await_exit(&mut exited_rx, grace_timeout).await {
            tracing::info!(server = %self.config.id, pid, "Process exited within grace period");
            return Ok(());
        }

        tracing::warn!(
            server = %self.config.id,
            pid,
            "Process did not exit within grace period, killing"
        );
        match signal_process(pid, true) {
            Ok(()) | Err(SignalError::Gone) => {}
            Err(SignalError::Failed(msg)) => {
                return Err(Error::Stop(format!(
                    "Failed to kill process {} for server '{}': {}",
                    pid, self.config.id, msg
                )));
            }
        }

        // SIGKILL cannot be ignored; give the reaper a moment.
        Self::await_exit(&mut exited_rx, Duration::from_secs(2)).await;
        Ok(())
    }

    /// Waits until the watcher reports exit, bounded by `timeout`.
    async fn await_exit(exited_rx: &mut Option<watch::Receiver<bool>>, timeout: Duration) -> bool {
        let Some(rx) = exited_rx else {
            return true;
        };
        if *rx.borrow() {
            return true;
        }
        tokio::time::timeout(timeout, async {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    break;
                }
            }
        })
        .await
        .is_ok()
    }

    /// Drops the process handle without signalling.
    ///
    /// Used when an exit notification for the held pid has already been
    /// processed.
    pub fn forget(&mut self) {
        self.pid = None;
        self.exited_rx = None;
    }
}

enum SignalError {
    /// The process no longer exists.
    Gone,
    Failed(String),
}

#[cfg(unix)]
fn signal_process(pid: u32, force: bool) -> std::result::Result<(), SignalError> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let signal = if force {
        Signal::SIGKILL
    } else {
        Signal::SIGTERM
    };
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(SignalError::Gone),
        Err(e) => Err(SignalError::Failed(e.to_string())),
    }
}

#[cfg(not(unix))]
fn signal_process(_pid: u32, force: bool) -> std::result::Result<(), SignalError> {
    if force {
        Err(SignalError::Failed(
            "forced kill by pid is not supported on this platform".to_string(),
        ))
    } else {
        // No graceful signal on this platform; rely on the grace timeout
        // followed by the forced path.
        Ok(())
    }
}
