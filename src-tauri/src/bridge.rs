//! Isolation bridge
//!
//! The only surface the front end can reach. It carries exactly three
//! operations: backend URL, running status, and request forwarding through
//! the gateway. Process control stays on the privileged side.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::backend::{Payload, RequestGateway, RequestOptions};
use crate::error::RequestError;

#[derive(Clone, Default)]
pub struct IsolationBridge {
    gateway: Arc<RwLock<Option<RequestGateway>>>,
}

impl IsolationBridge {
    /// A bridge with no backend behind it yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gateway(gateway: RequestGateway) -> Self {
        Self {
            gateway: Arc::new(RwLock::new(Some(gateway))),
        }
    }

    /// Connect the bridge to a gateway. Privileged side only.
    pub async fn attach(&self, gateway: RequestGateway) {
        log::info!("[Bridge] Attached to {}", gateway.supervisor().base_url());
        *self.gateway.write().await = Some(gateway);
    }

    async fn current(&self) -> Option<RequestGateway> {
        self.gateway.read().await.clone()
    }

    /// Backend base URL, or `None` before a supervisor exists.
    pub async fn get_backend_url(&self) -> Option<String> {
        self.current().await.map(|g| g.supervisor().base_url())
    }

    /// Whether the backend is running; `false` before a supervisor exists.
    pub async fn backend_status(&self) -> bool {
        match self.current().await {
            Some(gateway) => gateway.supervisor().is_running().await,
            None => false,
        }
    }

    /// Forward a request and return its decoded body.
    pub async fn api_request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<Payload, RequestError> {
        let Some(gateway) = self.current().await else {
            log::warn!("[Bridge] Request to {} before backend initialization", path);
            return Err(RequestError::BridgeUninitialized);
        };

        gateway
            .forward(path, options)
            .await
            .map(|response| response.payload)
    }
}
