//! Container runtime backends -- a uniform contract over the docker and podman CLIs.

pub mod docker;
pub mod podman;
pub mod process;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use self::docker::DockerBackend;
pub use self::podman::PodmanBackend;

/// Status token reported when a container cannot be inspected.
pub const UNKNOWN_STATUS: &str = "unknown";

/// Default bound on a single `inspect` call.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}s", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },
}

/// Exit code and captured output of one runtime invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Operations the execution driver needs from a container runtime.
///
/// Every call is bounded by a timeout; a non-zero exit code is reported in
/// [`CommandOutput`] rather than as an error.
#[async_trait::async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Runtime binary name, e.g. `docker`.
    fn name(&self) -> &'static str;

    /// Run a full launch command (`docker run ...`). Stdout on success is the container id.
    async fn run_container(
        &self,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError>;

    /// Run `argv` inside a running container.
    async fn exec_command(
        &self,
        container_id: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError>;

    /// Normalized container state (`running`, `exited`, ...). Never fails:
    /// any problem is reported as [`UNKNOWN_STATUS`].
    async fn container_status(&self, container_id: &str) -> String;

    async fn stop_container(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError>;

    async fn container_logs(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError>;

    /// Force-remove a container.
    async fn remove_container(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError>;
}

/// The closed set of supported runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Docker,
    Podman,
}

impl BackendKind {
    /// Resolve a runtime name case-insensitively. Unknown names fall back to docker.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "podman" => BackendKind::Podman,
            "docker" => BackendKind::Docker,
            other => {
                tracing::warn!(backend = %other, "Unknown container backend, falling back to docker");
                BackendKind::Docker
            }
        }
    }

    /// Strict variant of [`BackendKind::from_name`] used to validate user input.
    pub fn parse_known(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "podman" => Some(BackendKind::Podman),
            "docker" => Some(BackendKind::Docker),
            _ => None,
        }
    }

    pub fn binary(&self) -> &'static str {
        match self {
            BackendKind::Docker => "docker",
            BackendKind::Podman => "podman",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary())
    }
}

/// Build the backend for `kind`.
pub fn build(kind: BackendKind, status_timeout: Duration) -> Arc<dyn ContainerBackend> {
    match kind {
        BackendKind::Docker => Arc::new(DockerBackend::new(status_timeout)),
        BackendKind::Podman => Arc::new(PodmanBackend::new(status_timeout)),
    }
}

/// Trim and lowercase the output of `inspect --format {{.State.Status}}`.
pub(crate) fn normalize_status(raw: &str) -> String {
    let status = raw.trim().to_ascii_lowercase();
    if status.is_empty() {
        UNKNOWN_STATUS.to_string()
    } else {
        status
    }
}
