//! Backend Supervisor
//!
//! Owns one backend process lifetime: spawn, readiness gate, stop.
//! Uses config, process, and health modules.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};

use super::config::{BackendEndpoint, BackendSettings};
use super::health::ReadinessProbe;
use super::process::{BackendEvent, BackendHandle};
use crate::error::StartupError;

/// Backlog of output lines kept for slow event subscribers.
const EVENT_CAPACITY: usize = 256;

/// How long a backend that never became ready gets to exit before it is killed.
const FAILED_START_GRACE: Duration = Duration::from_secs(5);

/// Supervises the backend process.
///
/// `start` and `stop` are expected to be called from one supervisory task;
/// at most one of them may be in flight at a time. Everything else is safe to
/// call concurrently.
pub struct ProcessSupervisor {
    settings: BackendSettings,
    endpoint: BackendEndpoint,
    /// Present iff the backend counts as running.
    handle: Mutex<Option<BackendHandle>>,
    events: broadcast::Sender<BackendEvent>,
}

impl ProcessSupervisor {
    pub fn new(settings: BackendSettings) -> Self {
        let endpoint = settings.endpoint();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        log::info!("[Backend] Endpoint: {}", endpoint.base_url());

        Self {
            settings,
            endpoint,
            handle: Mutex::new(None),
            events,
        }
    }

    pub fn endpoint(&self) -> &BackendEndpoint {
        &self.endpoint
    }

    /// Base URL of the backend. Pure configuration, valid while stopped.
    pub fn base_url(&self) -> String {
        self.endpoint.base_url()
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Check if backend is running
    ///
    /// Reflects handle presence only; a process that died on its own still
    /// counts as running until `stop`.
    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    pub async fn pid(&self) -> Option<u32> {
        self.handle.lock().await.as_ref().and_then(|h| h.pid())
    }

    pub async fn started_at(&self) -> Option<DateTime<Utc>> {
        self.handle.lock().await.as_ref().map(|h| h.started_at())
    }

    /// Exit code observed for the current handle, if the process has exited.
    pub async fn exit_code(&self) -> Option<i32> {
        self.handle.lock().await.as_ref().and_then(|h| h.exit_code())
    }

    /// Subscribe to captured output and exit events.
    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    /// Start the backend and wait until it reports ready.
    ///
    /// The handle is published only after the probe succeeds. On probe
    /// exhaustion the child is terminated rather than left running.
    pub async fn start(&self) -> Result<(), StartupError> {
        if self.is_running().await {
            log::info!("[Backend] Already running");
            return Ok(());
        }

        log::info!("[Backend] Starting server at {}", self.base_url());

        let probe = ReadinessProbe::new(
            &self.endpoint,
            &self.settings.health_path,
            &self.settings.probe,
        )
        .map_err(|e| {
            log::error!("[Backend] Failed to build health client: {}", e);
            StartupError::HealthClient(e)
        })?;

        let spec = self.settings.launch_spec();
        let handle = BackendHandle::launch(&spec, self.events.clone()).map_err(|source| {
            log::error!("[Backend] Failed to spawn: {}", source);
            StartupError::SpawnFailed {
                executable: spec.executable.display().to_string(),
                source,
            }
        })?;

        let report = match probe.run().await {
            Ok(report) => report,
            Err(e) => {
                handle.shutdown(FAILED_START_GRACE).await;
                return Err(e);
            }
        };

        log::info!(
            "[Backend] Started successfully (PID: {:?}, {} health check(s) in {:?})",
            handle.pid(),
            report.attempts,
            report.elapsed
        );
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the backend server
    ///
    /// Sends a graceful termination signal and clears the handle without
    /// waiting for the exit. Idempotent.
    pub async fn stop(&self) {
        let Some(handle) = self.handle.lock().await.take() else {
            log::info!("[Backend] Not running");
            return;
        };

        log::info!("[Backend] Stopping (PID: {:?})...", handle.pid());
        handle.terminate().await;
        handle.release();
    }

    /// Stop the backend and wait up to `grace` for it to exit, force killing
    /// it afterwards. Use at host exit: dropping the runtime kills any child
    /// that is still running, released or not.
    pub async fn shutdown(&self, grace: Duration) {
        let Some(handle) = self.handle.lock().await.take() else {
            return;
        };

        log::info!("[Backend] Shutting down (PID: {:?})...", handle.pid());
        handle.shutdown(grace).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings_with_executable(executable: &str) -> BackendSettings {
        BackendSettings {
            executable: Some(PathBuf::from(executable)),
            working_dir: Some(std::env::temp_dir()),
            args: vec![],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn not_running_before_start() {
        let supervisor = ProcessSupervisor::new(BackendSettings::default());
        assert!(!supervisor.is_running().await);
        assert_eq!(supervisor.pid().await, None);
        assert_eq!(supervisor.base_url(), "http://127.0.0.1:8000");
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let supervisor = ProcessSupervisor::new(BackendSettings::default());
        supervisor.stop().await;
        supervisor.stop().await;
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn shutdown_without_start_is_noop() {
        let supervisor = ProcessSupervisor::new(BackendSettings::default());
        supervisor.shutdown(Duration::from_millis(10)).await;
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let supervisor =
            ProcessSupervisor::new(settings_with_executable("/nonexistent/ocrdesk-backend"));

        let err = supervisor.start().await.unwrap_err();

        assert!(matches!(err, StartupError::SpawnFailed { .. }));
        assert!(!supervisor.is_running().await);
    }
}
