//! Transport view of an execution record.

use serde::Serialize;

use super::ExecutionRecord;

/// JSON-ready form of an [`ExecutionRecord`].
///
/// Timestamps are RFC 3339 strings; absent optional fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionView {
    pub id: String,
    pub launch_command: String,
    pub test_command: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl From<&ExecutionRecord> for ExecutionView {
    fn from(record: &ExecutionRecord) -> Self {
        Self {
            id: record.id.clone(),
            launch_command: record.launch_command.clone(),
            test_command: record.test_command.clone(),
            status: record.status.as_str(),
            container_id: record.container_id.clone(),
            container_name: record.container_name.clone(),
            start_time: record.start_time.to_rfc3339(),
            end_time: record.end_time.map(|t| t.to_rfc3339()),
            test_output: record.test_output.clone(),
            error_message: record.error_message.clone(),
            exit_code: record.exit_code,
        }
    }
}

impl From<ExecutionRecord> for ExecutionView {
    fn from(record: ExecutionRecord) -> Self {
        Self::from(&record)
    }
}
