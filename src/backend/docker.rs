//! Docker CLI backend.

use std::time::Duration;

use super::process::{self, RuntimeCli};
use super::{BackendError, CommandOutput, ContainerBackend};

/// Drives containers through the `docker` binary.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    cli: RuntimeCli,
}

impl DockerBackend {
    pub fn new(status_timeout: Duration) -> Self {
        Self {
            cli: RuntimeCli::new("docker", status_timeout),
        }
    }
}

#[async_trait::async_trait]
impl ContainerBackend for DockerBackend {
    fn name(&self) -> &'static str {
        self.cli.binary()
    }

    async fn run_container(
        &self,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        process::run_argv(argv, timeout).await
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
