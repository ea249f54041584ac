//! Status codes shared by node executions, workflow executions, and the CLI
//! exit path.

use serde::{Deserialize, Serialize};

/// Outcome of a node or workflow execution.
///
/// Discriminants are stable contract: the CLI surface returns them verbatim
/// as process exit codes, so renumbering is a breaking change. Over HTTP the
/// variant *name* is exposed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum StatusCode {
    /// Execution finished successfully
    Completed = 0,
    /// Execution failed with a non-domain error
    Failed = 1,
    /// Execution has not started yet
    Waiting = 2,
    /// Execution is currently running
    InProgress = 3,
    /// A node or workflow deadline elapsed
    TimedOut = 4,
    /// The workflow was misbuilt (empty graph, bad group, pathological scenario)
    PrerequisiteFail = 5,
    /// Environment problem raised by user code
    InfrastructureError = 6,
    /// Bad data encountered by user code
    DataError = 7,
    /// A downstream API call failed
    ApiCallFailure = 8,
    /// A network operation failed
    NetworkFailure = 9,
    /// Input or payload validation failed
    DataValidationFailure = 10,
    /// A required dependency was unavailable
    DependencyUnavailable = 11,
    /// Catch-all for unclassified outcomes
    Unknown = 255,
}

impl StatusCode {
    /// The stable numeric value used as a CLI exit code.
    pub fn value(self) -> u8 {
        self as u8
    }

    /// The variant name as exposed over HTTP (e.g. `"IN_PROGRESS"`).
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Completed => "COMPLETED",
            StatusCode::Failed => "FAILED",
            StatusCode::Waiting => "WAITING",
            StatusCode::InProgress => "IN_PROGRESS",
            StatusCode::TimedOut => "TIMED_OUT",
            StatusCode::PrerequisiteFail => "PREREQUISITE_FAIL",
            StatusCode::InfrastructureError => "INFRASTRUCTURE_ERROR",
            StatusCode::DataError => "DATA_ERROR",
            StatusCode::ApiCallFailure => "API_CALL_FAILURE",
            StatusCode::NetworkFailure => "NETWORK_FAILURE",
            StatusCode::DataValidationFailure => "DATA_VALIDATION_FAILURE",
            StatusCode::DependencyUnavailable => "DEPENDENCY_UNAVAILABLE",
            StatusCode::Unknown => "UNKNOWN",
        }
    }

    /// Whether this status is terminal (anything but `Waiting`/`InProgress`).
    pub fn is_terminal(self) -> bool {
        !matches!(self, StatusCode::Waiting | StatusCode::InProgress)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values_are_stable() {
        assert_eq!(StatusCode::Completed.value(), 0);
        assert_eq!(StatusCode::Failed.value(), 1);
        assert_eq!(StatusCode::TimedOut.value(), 4);
        assert_eq!(StatusCode::DataError.value(), 7);
        assert_eq!(StatusCode::Unknown.value(), 255);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!StatusCode::Waiting.is_terminal());
        assert!(!StatusCode::InProgress.is_terminal());
        assert!(StatusCode::Completed.is_terminal());
        assert!(StatusCode::DataError.is_terminal());
    }

    #[test]
    fn test_serializes_by_name() {
        let json = serde_json::to_string(&StatusCode::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let back: StatusCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StatusCode::InProgress);
    }
}
