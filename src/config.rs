//! TOML configuration for the container test manager.
//!
//! Every section has compiled-in defaults, so an empty file (or no file at
//! all) is a valid configuration. Lookup order is an explicit path, then the
//! `CTM_CONFIG` environment variable, then the system location.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::BackendKind;
use crate::execution::DriverSettings;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "CTM_CONFIG";

/// Standard system location of the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/container-test-manager/config.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the configuration:
    /// 1. `explicit` path, if given (errors are returned, not swallowed).
    /// 2. The path in `CTM_CONFIG`.
    /// 3. `/etc/container-test-manager/config.toml`.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }

    /// Steps 2-4 of [`AppConfig::resolve`]. The first candidate that loads
    /// wins; a broken file is skipped with a warning.
    pub fn load_or_default() -> Self {
        let candidates = config_candidates(std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        for (source, path) in candidates {
            if source == ConfigSource::System && !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(cfg) => return cfg,
                Err(e) => warn!(
                    %source,
                    path = %path.display(),
                    error = %e,
                    "config file could not be loaded, trying next source"
                ),
            }
        }

        debug!("no usable config file, using compiled-in defaults");
        Self::default()
    }

    /// The configured runtime. Unknown names resolve to docker.
    pub fn backend_kind(&self) -> BackendKind {
        BackendKind::from_name(&self.backend.kind)
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            launch_timeout: Duration::from_secs(self.timeouts.launch_secs),
            exec_timeout: Duration::from_secs(self.timeouts.exec_secs),
            stop_timeout: Duration::from_secs(self.timeouts.stop_secs),
            logs_timeout: Duration::from_secs(self.timeouts.logs_secs),
            remove_timeout: Duration::from_secs(self.timeouts.remove_secs),
            readiness_delay: Duration::from_millis(self.driver.readiness_delay_ms),
        }
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.status_secs)
    }
}

/// Where a candidate config file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Env,
    System,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Env => f.write_str(CONFIG_ENV),
            ConfigSource::System => f.write_str("system"),
        }
    }
}

/// Implicit config locations in lookup order.
fn config_candidates(env_path: Option<PathBuf>) -> Vec<(ConfigSource, PathBuf)> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
        candidates.push((ConfigSource::Env, path));
    }
    candidates.push((ConfigSource::System, PathBuf::from(SYSTEM_CONFIG_PATH)));
    candidates
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the API listener.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9595".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Container runtime selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// `docker` or `podman`. Anything else falls back to docker.
    pub kind: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: "docker".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Upper bounds for each runtime call, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// `<runtime> run`
    pub launch_secs: u64,
    /// `<runtime> exec` -- the test command itself.
    pub exec_secs: u64,
    /// `<runtime> inspect`
    pub status_secs: u64,
    pub stop_secs: u64,
    pub logs_secs: u64,
    pub remove_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            launch_secs: 60,
            exec_secs: 300,
            status_secs: 10,
            stop_secs: 10,
            logs_secs: 30,
            remove_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Pause between container start and the readiness check.
    pub readiness_delay_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            readiness_delay_ms: 2000,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log output configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
