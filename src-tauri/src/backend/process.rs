//! Backend Process Management
//!
//! Spawning, output capture, exit observation and termination of the
//! backend child process.

use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::config::LaunchSpec;

/// Which standard stream a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Informational events from the backend process. Never drive control flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendEvent {
    Output { stream: OutputStream, line: String },
    Exited { code: Option<i32> },
}

/// Exit observed by the exit watcher. `code` is `None` when killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendExit {
    pub code: Option<i32>,
}

/// Exclusive ownership of one spawned backend process.
///
/// The child itself lives inside the exit observer task and is spawned with
/// `kill_on_drop`. Dropping a handle that was never [`release`](Self::release)d
/// aborts the observer, which drops and kills the child.
pub struct BackendHandle {
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    exit: watch::Receiver<Option<BackendExit>>,
    observer: Option<JoinHandle<()>>,
}

impl BackendHandle {
    /// Spawn the backend and wire up output capture and exit observation.
    pub fn launch(spec: &LaunchSpec, events: broadcast::Sender<BackendEvent>) -> std::io::Result<Self> {
        let mut child = spawn_backend(spec)?;
        let pid = child.id();
        let started_at = Utc::now();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, OutputStream::Stdout, events.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, OutputStream::Stderr, events.clone()));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let observer = tokio::spawn(observe_exit(child, exit_tx, events));

        log::info!("[Backend] Spawned with PID {:?}", pid);

        Ok(Self {
            pid,
            started_at,
            exit: exit_rx,
            observer: Some(observer),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Exit status once the observer has seen the process end.
    pub fn exit(&self) -> Option<BackendExit> {
        *self.exit.borrow()
    }

    /// Exit code, if the process has exited with one.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit().and_then(|e| e.code)
    }

    /// Send a graceful termination signal. No-op once the process has exited.
    pub async fn terminate(&self) {
        if self.exit().is_some() {
            return;
        }
        let Some(pid) = self.pid else {
            return;
        };
        if let Err(e) = graceful_kill_process(pid).await {
            log::error!("[Backend] Failed to signal PID {}: {}", pid, e);
        }
    }

    /// Terminate and wait up to `grace` for the exit, killing the process if
    /// it is still alive afterwards.
    pub async fn shutdown(self, grace: Duration) {
        self.terminate().await;

        let mut exit = self.exit.clone();
        let exited = tokio::time::timeout(grace, exit.wait_for(Option::is_some))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);

        if exited {
            self.release();
        } else {
            log::warn!("[Backend] No exit after {:?}, force killing...", grace);
            drop(self);
        }
    }

    /// Give up ownership without killing: the observer keeps running until
    /// the process exits and still reports its exit code.
    pub fn release(mut self) {
        self.observer.take();
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.take() {
            if self.exit().is_none() {
                log::info!("[Backend] Killing unreleased process (PID: {:?})", self.pid);
            }
            observer.abort();
        }
    }
}

/// Spawn the backend process with piped output
pub fn spawn_backend(spec: &LaunchSpec) -> std::io::Result<Child> {
    log::info!("[Backend] Executable: {}", spec.executable.display());
    log::info!("[Backend] Working directory: {}", spec.working_dir.display());
    log::info!("[Backend] Args: {:?}", spec.args);

    let mut cmd = Command::new(&spec.executable);
    cmd.args(&spec.args)
        .current_dir(&spec.working_dir)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Windows: hide console window
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    }

    cmd.spawn()
}

async fn forward_lines<R>(reader: R, stream: OutputStream, events: broadcast::Sender<BackendEvent>)
where
    R: AsyncRead + Unpin,
{
    // Raw bytes so a non-UTF-8 line does not end capture
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("[Backend] Stopped reading {:?}: {}", stream, e);
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        if line.is_empty() {
            continue;
        }
        match stream {
            OutputStream::Stderr if line.contains("ERROR") || line.contains("Exception") => {
                log::error!("[Backend Error] {}", line);
            }
            _ => log::info!("[Backend] {}", line),
        }
        // Ignore error if no subscribers
        let _ = events.send(BackendEvent::Output { stream, line });
    }
}

async fn observe_exit(
    mut child: Child,
    exit_tx: watch::Sender<Option<BackendExit>>,
    events: broadcast::Sender<BackendEvent>,
) {
    let code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            log::error!("[Backend] Error waiting for process: {}", e);
            None
        }
    };

    log::info!("[Backend] Process exited with code {:?}", code);
    let _ = exit_tx.send(Some(BackendExit { code }));
    let _ = events.send(BackendEvent::Exited { code });
}

/// Gracefully terminate a process (SIGTERM)
#[cfg(not(target_os = "windows"))]
pub async fn graceful_kill_process(pid: u32) -> std::io::Result<()> {
    Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .output()
        .await
        .map(|_| ())
}

#[cfg(target_os = "windows")]
pub async fn graceful_kill_process(pid: u32) -> std::io::Result<()> {
    // Tree kill without /F
    Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/T"])
        .output()
        .await
        .map(|_| ())
}
