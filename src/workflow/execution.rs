//! Per-attempt execution records for workflows.

use crate::error::WorkflowError;
use crate::node::execution::{ExecutionTimes, NodeExecution};
use crate::status::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Output section of a workflow attempt: every node execution that finished
/// during the attempt, in completion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowOutput {
    /// Completed node executions, appended as the scheduler reaps them
    pub nodes_executions: Vec<NodeExecution>,
}

/// A single attempt of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Attempt ordinal, 1-based
    pub id: String,
    /// Start/end stamps
    pub times: ExecutionTimes,
    /// Attempt status
    pub status: StatusCode,
    /// Node executions collected during the attempt
    pub output: WorkflowOutput,
}

impl WorkflowExecution {
    /// Open a fresh attempt: `IN_PROGRESS`, start stamped.
    pub fn open(attempt: usize) -> Self {
        Self {
            id: attempt.to_string(),
            times: ExecutionTimes {
                start_time: Some(Utc::now()),
                end_time: None,
            },
            status: StatusCode::InProgress,
            output: WorkflowOutput::default(),
        }
    }

    /// Record the status of the error that aborted this attempt.
    pub fn record_failure(&mut self, error: &WorkflowError) {
        self.status = error.exit_code();
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
    fn test_lifecycle() {
        let mut execution = WorkflowExecution::open(1);
        assert_eq!(execution.id, "1");
        assert_eq!(execution.status, StatusCode::InProgress);

        execution.finalize();
        assert_eq!(execution.status, StatusCode::Completed);
        assert!(execution.times.process_time().is_some());
    }

    #[test]
    fn test_failure_status_survives_finalize() {
        let mut execution = WorkflowExecution::open(2);
        execution.record_failure(&WorkflowError::timeout(5));
        execution.finalize();
        assert_eq!(execution.status, StatusCode::TimedOut);
    }
}
