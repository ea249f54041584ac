//! Per-attempt execution records for nodes.

use crate::error::WorkflowError;
use crate::status::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Start/end stamps shared by node and workflow executions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionTimes {
    /// When the attempt was opened
    pub start_time: Option<DateTime<Utc>>,
    /// When the attempt was finalized; stamped on every exit path
    pub end_time: Option<DateTime<Utc>>,
}

impl ExecutionTimes {
    /// Wall-clock duration of the attempt, once both stamps exist.
    pub fn process_time(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Human-readable duration for summary log lines.
    pub fn process_time_display(&self) -> String {
        match self.process_time() {
            Some(duration) => format!("{}ms", duration.num_milliseconds()),
            None => "n/a".to_string(),
        }
    }
}

/// Error captured on a failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeError {
    /// Status the error resolved to
    pub status: StatusCode,
    /// Class name of the originating error
    pub exception_class_name: String,
    /// Error message
    pub exception_message: String,
}

impl NodeError {
    /// Build an error record from an engine error.
    pub fn from_error(error: &WorkflowError) -> Self {
        Self {
            status: error.exit_code(),
            exception_class_name: error.exception_class_name().to_string(),
            exception_message: error.to_string(),
        }
    }
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.exception_class_name, self.exception_message, self.status
        )
    }
}

/// A single attempt of a node body.
///
/// Appended to the node's attempt list when the attempt opens and never
/// removed; a retry appends a fresh record instead of revisiting this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    /// Unique execution id
    pub id: Uuid,
    /// Name of the node this attempt belongs to
    pub name: String,
    /// Start/end stamps
    pub times: ExecutionTimes,
    /// Attempt status
    pub status: StatusCode,
    /// Output container owned by this attempt; written by the node body
    pub output: serde_json::Value,
    /// Error for this attempt, if it failed
    pub error: Option<NodeError>,
}

impl NodeExecution {
    /// Open a fresh attempt record: `IN_PROGRESS`, start stamped.
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            times: ExecutionTimes {
                start_time: Some(Utc::now()),
                end_time: None,
            },
            status: StatusCode::InProgress,
            output: serde_json::Value::Null,
            error: None,
        }
    }

    /// Record a failure: status and error are taken from the engine error.
    pub fn record_failure(&mut self, error: &WorkflowError) {
        self.status = error.exit_code();
        self.error = Some(NodeError::from_error(error));
    }

    /// Finalize the attempt: stamp `end_time` if missing and promote a still
    /// `IN_PROGRESS` status to `COMPLETED`.
    pub fn finalize(&mut self) {
        if self.times.end_time.is_none() {
            self.times.end_time = Some(Utc::now());
        }
        if self.status == StatusCode::InProgress {
            self.status = StatusCode::Completed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_execution_is_in_progress() {
        let execution = NodeExecution::open("fetch-rows");
        assert_eq!(execution.status, StatusCode::InProgress);
        assert!(execution.times.start_time.is_some());
        assert!(execution.times.end_time.is_none());
        assert!(execution.error.is_none());
    }

    #[test]
    fn test_finalize_promotes_to_completed() {
        let mut execution = NodeExecution::open("fetch-rows");
        execution.finalize();
        assert_eq!(execution.status, StatusCode::Completed);
        let process_time = execution.times.process_time().unwrap();
        assert!(process_time >= Duration::zero());
    }

    #[test]
    fn test_failure_keeps_recorded_status() {
        let mut execution = NodeExecution::open("fetch-rows");
        execution.record_failure(&WorkflowError::data("bad row"));
        execution.finalize();
        assert_eq!(execution.status, StatusCode::DataError);
        let error = execution.error.unwrap();
        assert_eq!(error.exception_class_name, "DataErrorException");
        assert!(execution.times.end_time.is_some());
    }
}
