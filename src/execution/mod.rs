//! Execution lifecycle -- records, the in-memory registry, and the driver
//! that walks each submitted job through container start and test run.

pub mod driver;
pub mod launch;
pub mod registry;
pub mod view;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::driver::{DriverSettings, ExecutionDriver, StopError, SubmitError};
pub use self::registry::ExecutionRegistry;
pub use self::view::ExecutionView;

/// Lifecycle state of an execution.
///
/// Normal pipeline: `Pending -> Starting -> Running -> Testing -> Completed | Failed`.
/// `Stopped` is only entered through an explicit stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Starting,
    Running,
    Testing,
    Completed,
    Failed,
    Stopped,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Stopped
        )
    }

    /// Position in the pipeline. All terminal states share the last rank.
    fn rank(&self) -> u8 {
        match self {
            ExecutionStatus::Pending => 0,
            ExecutionStatus::Starting => 1,
            ExecutionStatus::Running => 2,
            ExecutionStatus::Testing => 3,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Stopped => 4,
        }
    }

    /// Whether moving from `self` to `next` goes forward (or stays put).
    pub fn can_advance_to(&self, next: ExecutionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Starting => "starting",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Testing => "testing",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted (launch command, test command) job.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub id: String,
    pub launch_command: String,
    pub test_command: String,
    pub status: ExecutionStatus,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub test_output: Option<String>,
    pub error_message: Option<String>,
    pub exit_code: Option<i32>,
}

impl ExecutionRecord {
    pub fn new(id: String, launch_command: String, test_command: String) -> Self {
        Self {
            id,
            launch_command,
            test_command,
            status: ExecutionStatus::Pending,
            container_id: None,
            container_name: None,
            start_time: Utc::now(),
            end_time: None,
            test_output: None,
            error_message: None,
            exit_code: None,
        }
    }
}

/// Partial update merged into a record by [`ExecutionRegistry::update`].
///
/// Only `Some` fields are written. `error_message` is doubly optional so a
/// patch can record "no error" explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    pub end_time: Option<DateTime<Utc>>,
    pub test_output: Option<String>,
    pub error_message: Option<Option<String>>,
    pub exit_code: Option<i32>,
}

impl ExecutionUpdate {
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Terminal failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(ExecutionStatus::Failed),
            error_message: Some(Some(message.into())),
            end_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn stopped() -> Self {
        Self {
            status: Some(ExecutionStatus::Stopped),
            end_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub(crate) fn apply(self, record: &mut ExecutionRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(container_id) = self.container_id {
            record.container_id = Some(container_id);
        }
        if let Some(container_name) = self.container_name {
            record.container_name = Some(container_name);
        }
        if let Some(end_time) = self.end_time {
            record.end_time = Some(end_time);
        }
        if let Some(test_output) = self.test_output {
            record.test_output = Some(test_output);
        }
        if let Some(error_message) = self.error_message {
            record.error_message = error_message;
        }
        if let Some(exit_code) = self.exit_code {
            record.exit_code = Some(exit_code);
        }
    }
}
