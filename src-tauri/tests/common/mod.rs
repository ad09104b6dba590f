//! Fake OCR backend for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use ocrdesk_lib::backend::config::ProbeSettings;
use ocrdesk_lib::BackendSettings;

pub struct FakeBackend {
    pub port: u16,
    /// Every request the server has seen, health checks included.
    pub hits: Arc<AtomicU32>,
    pub health_hits: Arc<AtomicU32>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl FakeBackend {
    /// Start a fake backend whose `/health` reports ready from call `ready_from` on.
    /// `None` never reports ready (HTTP 503).
    pub async fn start(ready_from: Option<u32>) -> Self {
        let hits = Arc::new(AtomicU32::new(0));
        let health_hits = Arc::new(AtomicU32::new(0));

        let health_counter = health_hits.clone();
        let total = hits.clone();
        let app = Router::new()
            .route(
                "/health",
                get(move || {
                    let n = health_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        match ready_from {
                            Some(k) if n >= k => (StatusCode::OK, Json(json!({"status": "ok"}))),
                            Some(_) => (StatusCode::OK, Json(json!({"status": "starting"}))),
                            None => (
                                StatusCode::SERVICE_UNAVAILABLE,
                                Json(json!({"status": "down"})),
                            ),
                        }
                    }
                }),
            )
            .route("/api/v1/files", get(|| async { Json(json!({"id": 1})) }))
            .route("/api/v1/ping", get(|| async { "pong" }))
            .route(
                "/api/v1/echo",
                any(|method: Method, headers: HeaderMap, body: String| async move {
                    let token = headers
                        .get("x-request-token")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    Json(json!({
                        "method": method.as_str(),
                        "token": token,
                        "body": body,
                    }))
                }),
            )
            .layer(middleware::from_fn(move |req: Request, next: Next| {
                let total = total.clone();
                async move {
                    total.fetch_add(1, Ordering::SeqCst);
                    next.run(req).await
                }
            }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            port,
            hits,
            health_hits,
            shutdown: Some(tx),
            server: Some(server),
        }
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn health_hits(&self) -> u32 {
        self.health_hits.load(Ordering::SeqCst)
    }

    /// Stop serving and wait until the listener is closed.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            let _ = server.await;
        }
    }
}

/// Settings that run `script` under `sh` against the fake backend's port.
pub fn shell_settings(port: u16, script: &str, max_attempts: u32) -> BackendSettings {
    BackendSettings {
        port,
        executable: Some(PathBuf::from("sh")),
        working_dir: Some(std::env::temp_dir()),
        args: vec!["-c".to_string(), script.to_string()],
        probe: ProbeSettings {
            max_attempts,
            delay_ms: 10,
            timeout_ms: 500,
        },
        ..Default::default()
    }
}
