//! Backend Configuration
//!
//! Static settings for the OCR backend: endpoint, launch command, probe budget.
//! Loaded from `{data_dir}/settings.json`, then overridden by environment and CLI.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Directory holding the Python service, looked up relative to several roots.
const BACKEND_DIR_NAME: &str = "python-backend";

/// Fixed network location of the backend.
///
/// Set once when the supervisor is built and never reassigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    host: String,
    port: u16,
}

impl BackendEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://{host}:{port}` with no trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Plain concatenation of the base URL and `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

/// Readiness probe budget
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeSettings {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        // 30 attempts at one per second
        Self {
            max_attempts: 30,
            delay_ms: 1000,
            timeout_ms: 1000,
        }
    }
}

impl ProbeSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Backend settings from the `backend` section of settings.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub host: String,
    pub port: u16,
    /// Interpreter or server binary. Resolved from the working directory when unset.
    pub executable: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    /// Argument vector; `{host}` and `{port}` are expanded at launch.
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Path polled for readiness. The stock OCR backend (`app.main:app`) mounts
    /// its health route under the API prefix, so run it with
    /// `"health_path": "/api/v1/health"` in the `backend` section of settings.json
    /// or `OCRDESK_BACKEND_HEALTH_PATH`.
    pub health_path: String,
    pub probe: ProbeSettings,
    /// Upper bound for a single forwarded request. `None` leaves it to the transport.
    pub request_timeout_ms: Option<u64>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            executable: None,
            working_dir: None,
            args: default_args(),
            env: HashMap::new(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            probe: ProbeSettings::default(),
            request_timeout_ms: Some(60_000),
        }
    }
}

fn default_args() -> Vec<String> {
    [
        "-m",
        "uvicorn",
        "app.main:app",
        "--host",
        "{host}",
        "--port",
        "{port}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Settings file structure
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    backend: BackendSettings,
}

/// Everything needed to spawn the backend process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl BackendSettings {
    pub fn endpoint(&self) -> BackendEndpoint {
        BackendEndpoint::new(self.host.clone(), self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Apply `OCRDESK_BACKEND_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OCRDESK_BACKEND_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("OCRDESK_BACKEND_PORT") {
            match port.parse() {
                Ok(p) => self.port = p,
                Err(e) => log::warn!("[Backend] Ignoring OCRDESK_BACKEND_PORT={}: {}", port, e),
            }
        }
        if let Some(exe) = lookup("OCRDESK_BACKEND_EXECUTABLE") {
            self.executable = Some(PathBuf::from(exe));
        }
        if let Some(dir) = lookup("OCRDESK_BACKEND_DIR") {
            self.working_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup("OCRDESK_BACKEND_HEALTH_PATH") {
            self.health_path = path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "probe.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if !self.health_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "health_path must start with '/': {}",
                self.health_path
            )));
        }
        Ok(())
    }

    /// Argument vector with `{host}` and `{port}` expanded.
    pub fn launch_args(&self) -> Vec<String> {
        let port = self.port.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{host}", &self.host).replace("{port}", &port))
            .collect()
    }

    /// Resolve executable, working directory, args and environment.
    pub fn launch_spec(&self) -> LaunchSpec {
        let working_dir = self
            .working_dir
            .clone()
            .unwrap_or_else(resolve_working_directory);
        let executable = self
            .executable
            .clone()
            .unwrap_or_else(|| resolve_python_path(&working_dir));

        let mut env_vars = HashMap::new();
        // Unbuffered output so log lines arrive as they are written
        env_vars.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        env_vars.extend(self.env.clone());

        LaunchSpec {
            executable,
            working_dir,
            args: self.launch_args(),
            env: env_vars,
        }
    }
}

/// Get the OCR Desk data directory
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = env::var_os("OCRDESK_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|h| h.join(".ocrdesk"))
        .unwrap_or_else(|| PathBuf::from(".ocrdesk"))
}

/// Get settings.json path
pub fn get_settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

/// Read backend settings. A missing file yields defaults.
pub fn read_settings(path: &Path) -> Result<BackendSettings, ConfigError> {
    if !path.exists() {
        return Ok(BackendSettings::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let file: SettingsFile = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(file.backend)
}

/// Load backend settings, falling back to defaults on a bad file.
pub fn load_settings(path: &Path) -> BackendSettings {
    match read_settings(path) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("[Backend] {}; using defaults", e);
            BackendSettings::default()
        }
    }
}

/// Find the directory the backend should run in.
pub fn resolve_working_directory() -> PathBuf {
    // Packaged: python-backend next to the executable
    if let Ok(exe_path) = env::current_exe() {
        if let Some(parent) = exe_path.parent() {
            let bundled = parent.join(BACKEND_DIR_NAME);
            if bundled.exists() {
                return bundled;
            }
        }
    }

    // Development: cwd or up to three parents
    if let Ok(cwd) = env::current_dir() {
        let mut current = Some(cwd.as_path());
        for _ in 0..4 {
            let Some(dir) = current else { break };
            let candidate = dir.join(BACKEND_DIR_NAME);
            if candidate.exists() {
                return candidate;
            }
            current = dir.parent();
        }
        return cwd;
    }

    PathBuf::from(".")
}

/// Get the Python executable for a backend directory
pub fn resolve_python_path(working_dir: &Path) -> PathBuf {
    let candidates: [PathBuf; 2] = if cfg!(target_os = "windows") {
        [
            working_dir.join(".venv").join("Scripts").join("python.exe"),
            working_dir.join("python-embed").join("python.exe"),
        ]
    } else {
        [
            working_dir.join(".venv").join("bin").join("python"),
            working_dir.join("python-venv").join("bin").join("python"),
        ]
    };

    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    // Fall back to PATH lookup by the OS
    if cfg!(target_os = "windows") {
        PathBuf::from("python")
    } else {
        PathBuf::from("python3")
    }
}
