//! Runtime CLI process wrapper -- spawn, capture output, enforce timeouts.

use std::process::Stdio;
use std::time::Duration;

use super::{BackendError, CommandOutput};

/// Run `program args...` and capture its exit code, stdout and stderr.
///
/// The child is killed if `timeout` elapses before it exits. A child killed by a
/// signal reports exit code `-1`.
pub async fn run(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutput, BackendError> {
    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| BackendError::Spawn {
            program: program.to_string(),
            source,
        })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(source)) => Err(BackendError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(BackendError::Timeout {
            command: describe(program, args),
            timeout,
        }),
    }
}

/// Run a full argv where `argv[0]` is the program.
pub async fn run_argv(argv: &[String], timeout: Duration) -> Result<CommandOutput, BackendError> {
    let (program, args) = argv.split_first().ok_or(BackendError::EmptyCommand)?;
    run(program, args, timeout).await
}

/// Subcommand invocations shared by every CLI-compatible runtime.
#[derive(Debug, Clone)]
pub struct RuntimeCli {
    binary: &'static str,
    status_timeout: Duration,
}

impl RuntimeCli {
    pub fn new(binary: &'static str, status_timeout: Duration) -> Self {
        Self {
            binary,
            status_timeout,
        }
    }

    pub fn binary(&self) -> &'static str {
        self.binary
    }

    /// `<bin> <args...>`
    pub async fn invoke(
        &self,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        tracing::debug!(binary = self.binary, ?args, "Invoking container runtime");
        run(self.binary, &args, timeout).await
    }

    /// `<bin> exec <id> <argv...>`
    pub async fn exec(
        &self,
        container_id: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        if argv.is_empty() {
            return Err(BackendError::EmptyCommand);
        }
        let mut args = vec!["exec".to_string(), container_id.to_string()];
        args.extend(argv.iter().cloned());
        self.invoke(args, timeout).await
    }

    /// `<bin> inspect <id> --format {{.State.Status}}`, normalized; `unknown` on any failure.
    pub async fn status(&self, container_id: &str) -> String {
        let args = vec![
            "inspect".to_string(),
            container_id.to_string(),
            "--format".to_string(),
            "{{.State.Status}}".to_string(),
        ];
        match self.invoke(args, self.status_timeout).await {
            Ok(out) if out.success() => super::normalize_status(&out.stdout),
            Ok(out) => {
                tracing::warn!(
                    binary = self.binary,
                    %container_id,
                    exit_code = out.exit_code,
                    stderr = %out.stderr.trim(),
                    "Container inspect failed"
                );
                super::UNKNOWN_STATUS.to_string()
            }
            Err(e) => {
                tracing::error!(binary = self.binary, %container_id, "Error getting container status: {}", e);
                super::UNKNOWN_STATUS.to_string()
            }
        }
    }

    /// `<bin> <subcommand> <id>`
    pub async fn on_container(
        &self,
        subcommand: &str,
        container_id: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        self.invoke(vec![subcommand.to_string(), container_id.to_string()], timeout)
            .await
    }
}

/// Short human-readable label for a command: program plus subcommand.
fn describe(program: &str, args: &[String]) -> String {
    match args.first() {
        Some(sub) => format!("{} {}", program, sub),
        None => program.to_string(),
    }
}
