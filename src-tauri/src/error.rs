//! Error types for backend startup and forwarded requests.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Failure to bring the backend to a ready state.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The OS refused to create the child process.
    #[error("Failed to spawn backend '{executable}': {source}")]
    SpawnFailed {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    /// The HTTP client for health checks could not be built. Nothing was spawned.
    #[error("Failed to build health check client: {0}")]
    HealthClient(#[source] reqwest::Error),
    /// The readiness probe used up its attempt budget.
    #[error("Backend not ready after {attempts} health check attempts")]
    NotReady { attempts: u32 },
}

/// Failure of a request forwarded to the backend.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Backend is not running")]
    BackendUnavailable,
    #[error("Backend bridge is not initialized")]
    BridgeUninitialized,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RequestError {
    /// Stable identifier for the front end.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::BackendUnavailable => "backend_unavailable",
            RequestError::BridgeUninitialized => "bridge_uninitialized",
            RequestError::InvalidRequest(_) => "invalid_request",
            RequestError::Transport(_) => "transport",
        }
    }

    /// True when no call reached the backend because it is not there.
    ///
    /// Callers treat an uninitialized bridge the same as a stopped backend.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            RequestError::BackendUnavailable | RequestError::BridgeUninitialized
        )
    }
}

impl Serialize for RequestError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RequestError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid backend settings: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_grouping() {
        assert!(RequestError::BackendUnavailable.is_unavailable());
        assert!(RequestError::BridgeUninitialized.is_unavailable());
        assert!(!RequestError::InvalidRequest("bad".into()).is_unavailable());
    }

    #[test]
    fn serializes_kind_and_message() {
        let value = serde_json::to_value(RequestError::BackendUnavailable).unwrap();
        assert_eq!(value["kind"], "backend_unavailable");
        assert_eq!(value["message"], "Backend is not running");
    }

    #[test]
    fn not_ready_mentions_attempts() {
        let err = StartupError::NotReady { attempts: 30 };
        assert_eq!(
            err.to_string(),
            "Backend not ready after 30 health check attempts"
        );
    }
}
