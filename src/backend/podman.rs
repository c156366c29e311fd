//! Podman CLI backend.
//!
//! Podman accepts docker's command-line surface, so launch commands written
//! for docker are reused after swapping the binary token.

use std::time::Duration;

use super::process::{self, RuntimeCli};
use super::{BackendError, CommandOutput, ContainerBackend};

/// Drives containers through the `podman` binary.
#[derive(Debug, Clone)]
pub struct PodmanBackend {
    cli: RuntimeCli,
}

impl PodmanBackend {
    pub fn new(status_timeout: Duration) -> Self {
        Self {
            cli: RuntimeCli::new("podman", status_timeout),
        }
    }
}

/// Swap a leading `docker` program token for `podman`. Later tokens belong to
/// the container's own command and are never rewritten.
pub fn translate_command(argv: &[String]) -> Vec<String> {
    let mut translated = argv.to_vec();
    if let Some(program) = translated.first_mut().filter(|t| t.as_str() == "docker") {
        *program = "podman".to_string();
    }
    translated
}

#[async_trait::async_trait]
impl ContainerBackend for PodmanBackend {
    fn name(&self) -> &'static str {
        self.cli.binary()
    }

    async fn run_container(
        &self,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        process::run_argv(&translate_command(argv), timeout).await
    }

    async fn exec_command(
        &self,
        container_id: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        self.cli.exec(container_id, argv, timeout).await
    }

    async fn container_status(&self, container_id: &str) -> String {
        self.cli.status(container_id).await
    }

    async fn stop_container(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        self.cli.on_container("stop", container_id, timeout).await
    }

    async fn container_logs(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        self.cli.on_container("logs", container_id, timeout).await
    }

    async fn remove_container(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        self.cli
            .invoke(
                vec!["rm".to_string(), "-f".to_string(), container_id.to_string()],
                timeout,
            )
            .await
    }
}
