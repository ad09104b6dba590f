//! OCR Desk host core.
//!
//! Launches the OCR backend as a sidecar process, gates startup on its health
//! endpoint, and exposes it to the front end only through [`IsolationBridge`].

use std::sync::Arc;
use std::time::Duration;

pub mod backend;
pub mod bridge;
#[cfg(feature = "tauri")]
pub mod commands;
pub mod error;

pub use backend::{BackendSettings, ProcessSupervisor, RequestGateway};
pub use bridge::IsolationBridge;
pub use error::{ConfigError, RequestError, StartupError};

/// How long the backend gets to exit on host shutdown before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Privileged-side handles created at host startup.
pub struct Host {
    pub supervisor: Arc<ProcessSupervisor>,
    pub bridge: IsolationBridge,
}

impl Host {
    /// Build the supervisor and attach it to `bridge`. Does not spawn anything.
    pub async fn attach(settings: BackendSettings, bridge: IsolationBridge) -> Result<Self, reqwest::Error> {
        let supervisor = Arc::new(ProcessSupervisor::new(settings));
        let gateway = RequestGateway::new(Arc::clone(&supervisor))?;
        bridge.attach(gateway).await;
        Ok(Self { supervisor, bridge })
    }

    /// Start the backend. A failure leaves the host up in a degraded state:
    /// the bridge keeps answering and reports the backend as not running.
    pub async fn start_backend(&self) -> Result<(), StartupError> {
        self.supervisor.start().await
    }

    /// Start the backend, logging the outcome once. Returns whether it is up.
    pub async fn start_or_degrade(&self) -> bool {
        match self.start_backend().await {
            Ok(()) => {
                log::info!("[Startup] Backend available at {}", self.supervisor.base_url());
                true
            }
            Err(e) => {
                log::warn!("[Startup] Continuing without backend: {}", e);
                false
            }
        }
    }

    /// Stop the backend and wait for it to exit before returning.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown(SHUTDOWN_GRACE).await;
    }
}

/// Run the headless host until Ctrl-C.
pub async fn run(settings: BackendSettings) -> Result<(), reqwest::Error> {
    let host = Host::attach(settings, IsolationBridge::new()).await?;

    host.start_or_degrade().await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("[Startup] Failed to listen for shutdown signal: {}", e);
    }

    log::info!("[Startup] Shutting down...");
    host.shutdown().await;
    Ok(())
}
