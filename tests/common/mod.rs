//! Shared fixtures: a scripted container backend that never touches a real runtime.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use container_test_manager::backend::podman::translate_command;
use container_test_manager::backend::{BackendError, CommandOutput, ContainerBackend};
use container_test_manager::execution::{
    DriverSettings, ExecutionDriver, ExecutionRecord, ExecutionRegistry,
};

/// Canned answer for one kind of runtime call.
#[derive(Debug, Clone)]
pub enum Reply {
    Output(CommandOutput),
    Timeout,
    Panic,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Output(CommandOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Reply::Output(CommandOutput {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }

    fn resolve(&self, command: &str, timeout: Duration) -> Result<CommandOutput, BackendError> {
        match self {
            Reply::Output(out) => Ok(out.clone()),
            Reply::Timeout => Err(BackendError::Timeout {
                command: command.to_string(),
                timeout,
            }),
            Reply::Panic => panic!("scripted backend blew up on `{command}`"),
        }
    }
}

/// In-memory [`ContainerBackend`] returning scripted replies and recording every call.
///
/// Calls are recorded as argv vectors led by the operation: `["run", ...]`,
/// `["exec", cid, ...]`, `["inspect", cid]`, `["stop", cid]`, `["logs", cid]`, `["rm", cid]`.
pub struct ScriptedBackend {
    name: &'static str,
    run: Reply,
    exec: Reply,
    exec_delay: Duration,
    status: String,
    logs: Reply,
    stop: Reply,
    remove: Reply,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedBackend {
    /// A docker backend whose container starts as `abc123`, runs, and echoes `hi`.
    pub fn docker() -> Self {
        Self {
            name: "docker",
            run: Reply::ok("abc123\n"),
            exec: Reply::ok("hi\n"),
            exec_delay: Duration::ZERO,
            status: "running".to_string(),
            logs: Reply::ok(""),
            stop: Reply::ok("abc123\n"),
            remove: Reply::ok("abc123\n"),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Same script, but launch commands are translated the way podman does it.
    pub fn podman() -> Self {
        Self {
            name: "podman",
            ..Self::docker()
        }
    }

    pub fn with_run(mut self, reply: Reply) -> Self {
        self.run = reply;
        self
    }

    pub fn with_exec(mut self, reply: Reply) -> Self {
        self.exec = reply;
        self
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn with_logs(mut self, reply: Reply) -> Self {
        self.logs = reply;
        self
    }

    pub fn with_stop(mut self, reply: Reply) -> Self {
        self.stop = reply;
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls for one operation, without the leading operation token.
    pub fn calls_to(&self, op: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|call| call.first().map(String::as_str) == Some(op))
            .map(|call| call[1..].to_vec())
            .collect()
    }

    fn record(&self, op: &str, args: &[String]) {
        let mut call = vec![op.to_string()];
        call.extend(args.iter().cloned());
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl ContainerBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run_container(
        &self,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        // Same translation `PodmanBackend::run_container` applies before spawning.
        let argv = if self.name == "podman" {
            translate_command(argv)
        } else {
            argv.to_vec()
        };
        self.record("run", &argv);
        self.run.resolve(&argv.join(" "), timeout)
    }

    async fn exec_command(
        &self,
        container_id: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        let mut args = vec![container_id.to_string()];
        args.extend(argv.iter().cloned());
        self.record("exec", &args);
        if !self.exec_delay.is_zero() {
            tokio::time::sleep(self.exec_delay).await;
        }
        self.exec.resolve("exec", timeout)
    }

    async fn container_status(&self, container_id: &str) -> String {
        self.record("inspect", &[container_id.to_string()]);
        self.status.clone()
    }

    async fn stop_container(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        self.record("stop", &[container_id.to_string()]);
        self.stop.resolve("stop", timeout)
    }

    async fn container_logs(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        self.record("logs", &[container_id.to_string()]);
        self.logs.resolve("logs", timeout)
    }

    async fn remove_container(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        self.record("rm", &[container_id.to_string()]);
        self.remove.resolve("rm", timeout)
    }
}

/// Settings with a short readiness pause so tests finish quickly.
pub fn fast_settings() -> DriverSettings {
    DriverSettings {
        readiness_delay: Duration::from_millis(10),
        ..DriverSettings::default()
    }
}

pub fn driver_for(backend: &Arc<ScriptedBackend>) -> ExecutionDriver {
    let backend: Arc<dyn ContainerBackend> = backend.clone();
    ExecutionDriver::new(ExecutionRegistry::new(), backend, fast_settings())
}

/// Wait (bounded) for `id` to reach a terminal state.
pub async fn finish(driver: &ExecutionDriver, id: &str) -> ExecutionRecord {
    tokio::time::timeout(
        Duration::from_secs(5),
        driver.wait_for_terminal(id, Duration::from_millis(5)),
    )
    .await
    .expect("execution did not finish in time")
    .expect("execution record disappeared")
}
