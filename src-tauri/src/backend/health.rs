//! Backend Health Checks
//!
//! Bounded readiness polling against the backend's health endpoint.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::config::{BackendEndpoint, ProbeSettings};
use crate::error::StartupError;

/// Value of `status` that marks the backend as ready.
pub const READY_STATUS: &str = "ok";

/// Health check response from the backend
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Result of a single health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    /// Reachable, 2xx, but no readiness marker (or an unparsable body).
    NotReady,
    /// Non-2xx status.
    BadStatus(u16),
    /// Connection refused, timeout, or similar.
    Unreachable,
}

/// Bookkeeping for one iteration of the readiness loop.
#[derive(Debug, Clone)]
pub struct ProbeAttempt {
    /// 1-based
    pub index: u32,
    pub at: DateTime<Utc>,
    pub outcome: ProbeOutcome,
}

/// Loop state. `Probing` carries the next attempt index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Probing { attempt: u32 },
    Ready { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl ProbeState {
    /// Transition after an attempt with the given outcome.
    pub fn advance(self, outcome: ProbeOutcome, max_attempts: u32) -> ProbeState {
        match self {
            ProbeState::Probing { attempt } if outcome == ProbeOutcome::Ready => {
                ProbeState::Ready { attempts: attempt }
            }
            ProbeState::Probing { attempt } if attempt >= max_attempts => {
                ProbeState::Exhausted { attempts: attempt }
            }
            ProbeState::Probing { attempt } => ProbeState::Probing {
                attempt: attempt + 1,
            },
            terminal => terminal,
        }
    }
}

/// Summary of a successful readiness wait.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub attempts: u32,
    pub elapsed: Duration,
    pub history: Vec<ProbeAttempt>,
}

/// Polls `{base_url}{health_path}` until the readiness marker appears or the
/// attempt budget runs out. First success wins.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    client: reqwest::Client,
    url: String,
    max_attempts: u32,
    delay: Duration,
}

impl ReadinessProbe {
    pub fn new(
        endpoint: &BackendEndpoint,
        health_path: &str,
        settings: &ProbeSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;

        Ok(Self {
            client,
            url: endpoint.url(health_path),
            max_attempts: settings.max_attempts.max(1),
            delay: settings.delay(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Perform a single health check.
    pub async fn check(&self) -> ProbeOutcome {
        let response = match self.client.get(&self.url).send().await {
            Ok(r) => r,
            Err(_) => return ProbeOutcome::Unreachable,
        };

        if !response.status().is_success() {
            return ProbeOutcome::BadStatus(response.status().as_u16());
        }

        match response.json::<HealthResponse>().await {
            Ok(health) if health.status == READY_STATUS => ProbeOutcome::Ready,
            _ => ProbeOutcome::NotReady,
        }
    }

    /// Wait for the backend to respond to health checks.
    ///
    /// Sleeps `delay` between attempts, not after the last one, so the worst
    /// case is `max_attempts` checks plus `(max_attempts - 1) * delay`.
    pub async fn run(&self) -> Result<ProbeReport, StartupError> {
        let start = Instant::now();
        let mut history = Vec::with_capacity(self.max_attempts as usize);
        let mut state = ProbeState::Probing { attempt: 1 };

        loop {
            let ProbeState::Probing { attempt } = state else {
                break;
            };

            let outcome = self.check().await;
            log::debug!("[Health] Attempt {}/{}: {:?}", attempt, self.max_attempts, outcome);
            history.push(ProbeAttempt {
                index: attempt,
                at: Utc::now(),
                outcome,
            });

            state = state.advance(outcome, self.max_attempts);
            if matches!(state, ProbeState::Probing { .. }) {
                tokio::time::sleep(self.delay).await;
            }
        }

        match state {
            ProbeState::Ready { attempts } => {
                log::info!(
                    "[Health] Backend ready after {} attempt(s) ({:?})",
                    attempts,
                    start.elapsed()
                );
                Ok(ProbeReport {
                    attempts,
                    elapsed: start.elapsed(),
                    history,
                })
            }
            ProbeState::Exhausted { attempts } | ProbeState::Probing { attempt: attempts } => {
                log::error!(
                    "[Health] Backend not ready after {} attempts ({:?})",
                    attempts,
                    start.elapsed()
                );
                Err(StartupError::NotReady { attempts })
            }
        }
    }
}
