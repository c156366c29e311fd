//! Execution driver -- runs one background task per submitted job and walks
//! its record through the lifecycle:
//!
//! ```text
//! pending -> starting -> running -> testing -> completed | failed
//!                  \          \
//!                   failed     failed / stopped (external)
//! ```
//!
//! Every transition goes through [`ExecutionRegistry::update`]; the registry
//! lock is never held across a backend call. A record that was stopped or
//! deleted while a step was in flight is left alone: the registry rejects
//! patches to finished records and the pipeline gives up at its next step.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::launch::{self, LaunchError};
use super::{ExecutionRecord, ExecutionRegistry, ExecutionStatus, ExecutionUpdate};
use crate::backend::{BackendError, BackendKind, ContainerBackend};

/// Container states that count as ready for the test command.
const READY_STATES: &[&str] = &["running", "up"];

/// Per-call timeouts and the readiness pause.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub launch_timeout: Duration,
    pub exec_timeout: Duration,
    pub stop_timeout: Duration,
    pub logs_timeout: Duration,
    pub remove_timeout: Duration,
    /// Pause between container start and the readiness check.
    pub readiness_delay: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            launch_timeout: Duration::from_secs(60),
            exec_timeout: Duration::from_secs(300),
            stop_timeout: Duration::from_secs(10),
            logs_timeout: Duration::from_secs(30),
            remove_timeout: Duration::from_secs(30),
            readiness_delay: Duration::from_secs(2),
        }
    }
}

/// Rejected submissions. Nothing is recorded when one of these is returned.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Both launch command and test command are required")]
    MissingCommand,

    #[error("Invalid launch command: {0}")]
    InvalidLaunch(LaunchError),

    #[error("Invalid test command: {0}")]
    InvalidTest(LaunchError),

    #[error("Backend '{requested}' is not enabled on this server (active backend: {active})")]
    BackendMismatch { requested: String, active: String },
}

#[derive(Debug, Error)]
pub enum StopError {
    #[error("Execution not found")]
    NotFound,

    #[error("Execution has no container yet")]
    NoContainer,

    #[error("Failed to stop container: {0}")]
    Rejected(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Faults that abort the pipeline; recorded as the failure message.
#[derive(Debug, Error)]
enum DriverError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Invalid command: {0}")]
    Command(#[from] LaunchError),

    #[error("Container runtime returned no container id")]
    NoContainerId,
}

/// Orchestrates executions against one container backend.
///
/// Cheap to clone; clones share the registry and backend.
#[derive(Clone)]
pub struct ExecutionDriver {
    registry: ExecutionRegistry,
    backend: Arc<dyn ContainerBackend>,
    settings: DriverSettings,
}

impl ExecutionDriver {
    pub fn new(
        registry: ExecutionRegistry,
        backend: Arc<dyn ContainerBackend>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            registry,
            backend,
            settings,
        }
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Runtime tokens accepted at the start of a launch command.
    fn accepted_runtimes(&self) -> Vec<&'static str> {
        let mut runtimes = vec!["docker"];
        if self.backend.name() != "docker" {
            runtimes.push(self.backend.name());
        }
        runtimes
    }

    /// Validate a job, record it as `pending` and start it in the background.
    ///
    /// Returns the execution id without waiting for any container activity.
    pub async fn submit(
        &self,
        launch_command: &str,
        test_command: &str,
        backend: Option<&str>,
    ) -> Result<String, SubmitError> {
        let launch_command = launch_command.trim();
        let test_command = test_command.trim();
        if launch_command.is_empty() || test_command.is_empty() {
            return Err(SubmitError::MissingCommand);
        }

        if let Some(requested) = backend.map(str::trim).filter(|b| !b.is_empty()) {
            let matches_active = BackendKind::parse_known(requested)
                .is_some_and(|kind| kind.binary() == self.backend.name());
            if !matches_active {
                return Err(SubmitError::BackendMismatch {
                    requested: requested.to_string(),
                    active: self.backend.name().to_string(),
                });
            }
        }

        launch::parse_launch_command(launch_command, &self.accepted_runtimes())
            .map_err(SubmitError::InvalidLaunch)?;
        launch::parse_test_command(test_command).map_err(SubmitError::InvalidTest)?;

        let id = self.registry.create(launch_command, test_command).await;
        info!(execution_id = %id, backend = self.backend.name(), "Execution submitted");
        self.spawn(id.clone());
        Ok(id)
    }

    /// Run the pipeline for `id` on a new task.
    ///
    /// A panic inside the pipeline is caught by a supervising task and
    /// recorded as a failure.
    pub fn spawn(&self, id: String) -> JoinHandle<()> {
        let driver = self.clone();
        tokio::spawn(async move {
            let worker = {
                let driver = driver.clone();
                let id = id.clone();
                tokio::spawn(async move { driver.run(&id).await })
            };
            if let Err(e) = worker.await {
                error!(execution_id = %id, "Execution task aborted: {}", e);
                driver
                    .registry
                    .update(&id, ExecutionUpdate::failed(format!("Execution task aborted: {e}")))
                    .await;
            }
        })
    }

    /// Drive `id` to a terminal state. Faults are recorded, never returned.
    pub async fn run(&self, id: &str) {
        let Some(record) = self.registry.get(id).await else {
            warn!(execution_id = %id, "Execution vanished before it started");
            return;
        };

        if let Err(e) = self.run_pipeline(&record).await {
            error!(execution_id = %id, "Error in container test execution: {}", e);
            self.registry
                .update(id, ExecutionUpdate::failed(e.to_string()))
                .await;
        }
    }

    async fn run_pipeline(&self, record: &ExecutionRecord) -> Result<(), DriverError> {
        let id = record.id.as_str();

        if !self
            .advance(id, ExecutionUpdate::status(ExecutionStatus::Starting))
            .await
        {
            return Ok(());
        }

        let launch_argv = launch::tokenize(&record.launch_command)?;
        let test_argv = launch::parse_test_command(&record.test_command)?;
        let plan = launch::prepare(&launch_argv, id);

        info!(execution_id = %id, command = %plan.argv.join(" "), "Starting container");
        let started = self
            .backend
            .run_container(&plan.argv, self.settings.launch_timeout)
            .await?;

        if !started.success() {
            warn!(
                execution_id = %id,
                exit_code = started.exit_code,
                "Container failed to start"
            );
            self.registry
                .update(
                    id,
                    ExecutionUpdate::failed(format!(
                        "Failed to start container: {}",
                        started.stderr.trim()
                    )),
                )
                .await;
            return Ok(());
        }

        let container_id = started.stdout.trim().to_string();
        if container_id.is_empty() {
            return Err(DriverError::NoContainerId);
        }

        let running = ExecutionUpdate {
            status: Some(ExecutionStatus::Running),
            container_id: Some(container_id.clone()),
            container_name: Some(plan.container_name.clone()),
            ..Default::default()
        };
        if !self.advance(id, running).await {
            return Ok(());
        }
        info!(
            execution_id = %id,
            container_id = %container_id,
            container_name = %plan.container_name,
            "Container started"
        );

        tokio::time::sleep(self.settings.readiness_delay).await;
        if self.is_finished(id).await {
            return Ok(());
        }

        let state = self.backend.container_status(&container_id).await;
        if !READY_STATES.contains(&state.as_str()) {
            let logs = self.fetch_logs(&container_id).await;
            warn!(execution_id = %id, container_id = %container_id, %state, "Container is not running");
            self.registry
                .update(
                    id,
                    ExecutionUpdate::failed(format!(
                        "Container exited with status: {}. Logs: {}",
                        state, logs
                    )),
                )
                .await;
            return Ok(());
        }

        if !self
            .advance(id, ExecutionUpdate::status(ExecutionStatus::Testing))
            .await
        {
            return Ok(());
        }

        let result = self
            .backend
            .exec_command(&container_id, &test_argv, self.settings.exec_timeout)
            .await?;

        let status = if result.success() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        let error_message = Some(result.stderr).filter(|stderr| !stderr.is_empty());
        let finished = ExecutionUpdate {
            status: Some(status),
            test_output: Some(result.stdout),
            error_message: Some(error_message),
            exit_code: Some(result.exit_code),
            end_time: Some(Utc::now()),
            ..Default::default()
        };

        if self.registry.update(id, finished).await {
            info!(execution_id = %id, %status, exit_code = result.exit_code, "Execution finished");
        } else {
            info!(execution_id = %id, "Test result discarded: execution was stopped or deleted");
        }
        Ok(())
    }

    /// Apply one pipeline step. `false` means the record is gone or already finished.
    async fn advance(&self, id: &str, patch: ExecutionUpdate) -> bool {
        let applied = self.registry.update(id, patch).await;
        if !applied {
            info!(execution_id = %id, "Execution stopped or deleted, abandoning pipeline");
        }
        applied
    }

    async fn is_finished(&self, id: &str) -> bool {
        let finished = match self.registry.get(id).await {
            Some(record) => record.status.is_terminal(),
            None => true,
        };
        if finished {
            info!(execution_id = %id, "Execution stopped or deleted, abandoning pipeline");
        }
        finished
    }

    /// Best-effort container logs; failures yield an empty string.
    async fn fetch_logs(&self, container_id: &str) -> String {
        match self
            .backend
            .container_logs(container_id, self.settings.logs_timeout)
            .await
        {
            Ok(out) if out.success() => {
                let mut logs = out.stdout;
                if !out.stderr.trim().is_empty() {
                    if !logs.is_empty() && !logs.ends_with('\n') {
                        logs.push('\n');
                    }
                    logs.push_str(&out.stderr);
                }
                logs.trim_end().to_string()
            }
            Ok(out) => {
                warn!(
                    %container_id,
                    exit_code = out.exit_code,
                    stderr = %out.stderr.trim(),
                    "Could not fetch container logs"
                );
                String::new()
            }
            Err(e) => {
                warn!(%container_id, "Could not fetch container logs: {}", e);
                String::new()
            }
        }
    }

    /// Stop a container and mark every unfinished execution using it as `stopped`.
    ///
    /// Returns the ids of the executions that were marked.
    pub async fn stop_container(&self, container_id: &str) -> Result<Vec<String>, StopError> {
        let out = self
            .backend
            .stop_container(container_id, self.settings.stop_timeout)
            .await?;
        if !out.success() {
            return Err(StopError::Rejected(out.stderr.trim().to_string()));
        }

        let mut stopped = Vec::new();
        for id in self.registry.find_by_container(container_id).await {
            if self.registry.update(&id, ExecutionUpdate::stopped()).await {
                info!(execution_id = %id, %container_id, "Execution stopped");
                stopped.push(id);
            }
        }
        Ok(stopped)
    }

    /// Stop the container of execution `id`.
    pub async fn stop_execution(&self, id: &str) -> Result<(), StopError> {
        let record = self.registry.get(id).await.ok_or(StopError::NotFound)?;
        let container_id = record.container_id.ok_or(StopError::NoContainer)?;
        self.stop_container(&container_id).await.map(|_| ())
    }

    /// Remove execution `id`, stopping and removing its container first.
    ///
    /// Container cleanup is best-effort. Returns whether the record existed.
    pub async fn delete_execution(&self, id: &str) -> bool {
        let Some(record) = self.registry.get(id).await else {
            return false;
        };

        if let Some(container_id) = record.container_id.as_deref() {
            self.cleanup_container(container_id).await;
        }
        self.registry.delete(id).await
    }

    async fn cleanup_container(&self, container_id: &str) {
        match self
            .backend
            .stop_container(container_id, self.settings.stop_timeout)
            .await
        {
            Ok(out) if !out.success() => {
                warn!(%container_id, stderr = %out.stderr.trim(), "Container stop failed during cleanup")
            }
            Err(e) => error!(%container_id, "Error cleaning up container: {}", e),
            Ok(_) => {}
        }

        match self
            .backend
            .remove_container(container_id, self.settings.remove_timeout)
            .await
        {
            Ok(out) if !out.success() => {
                warn!(%container_id, stderr = %out.stderr.trim(), "Container removal failed during cleanup")
            }
            Err(e) => error!(%container_id, "Error cleaning up container: {}", e),
            Ok(_) => {}
        }
    }

    /// Poll until `id` is finished. `None` if the record disappears first.
    pub async fn wait_for_terminal(&self, id: &str, poll: Duration) -> Option<ExecutionRecord> {
        loop {
            let record = self.registry.get(id).await?;
            if record.status.is_terminal() {
                return Some(record);
            }
            tokio::time::sleep(poll).await;
        }
    }
}
