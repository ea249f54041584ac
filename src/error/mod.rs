//! Error types and handling for the FlowGraph engine.

use crate::status::StatusCode;
use thiserror::Error;

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Comprehensive error type for the FlowGraph engine.
///
/// Every variant maps to a [`StatusCode`] through [`WorkflowError::exit_code`],
/// which is what ultimately reaches the CLI exit path and the per-attempt
/// execution records.
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    /// A node with this name is already present in the graph
    #[error("node '{name}' already exists in the graph")]
    DuplicateNode {
        /// Conflicting node name
        name: String,
    },

    /// An edge endpoint references a node that is not in the graph
    #[error("node '{name}' does not exist in the graph")]
    UnknownNode {
        /// The missing node name
        name: String,
    },

    /// A node name failed the length constraint (3 to 30 characters)
    #[error("node name '{name}' must be between 3 and 30 characters")]
    InvalidNodeName {
        /// The rejected name
        name: String,
    },

    /// A workflow name failed the length constraint (2 to 64 characters)
    #[error("workflow name '{name}' must be between 2 and 64 characters")]
    InvalidWorkflowName {
        /// The rejected name
        name: String,
    },

    /// Source and destination of an edge are the same node
    #[error("cannot create a self-loop edge on '{name}'")]
    SelfLoop {
        /// The node name on both ends
        name: String,
    },

    /// The (source, destination) pair already exists
    #[error("edge '{edge_source}' -> '{destination}' already exists")]
    DuplicateEdge {
        /// Edge source name
        edge_source: String,
        /// Edge destination name
        destination: String,
    },

    /// Adding the edge would make the graph cyclic
    #[error("edge '{edge_source}' -> '{destination}' creates a cycle")]
    Cycle {
        /// Edge source name
        edge_source: String,
        /// Edge destination name
        destination: String,
    },

    /// The workflow graph holds no nodes
    #[error("workflow has no nodes to execute")]
    NodesNotFound,

    /// An execution group was declared without members
    #[error("execution group must include at least one node")]
    EmptyExecutionGroup,

    /// An execution group references nodes missing from the graph
    #[error("execution group contains unknown nodes: {names:?}")]
    UnknownGroupNodes {
        /// The unresolved names, sorted
        names: Vec<String>,
    },

    /// The scheduler hit a state an acyclic graph should never produce
    #[error("unsupported graph scenario: {0}")]
    UnsupportedGraphScenario(String),

    /// An endpoint name was registered twice
    #[error("endpoint '{name}' already registered")]
    DuplicateEndpoint {
        /// Conflicting endpoint name
        name: String,
    },

    /// A node or workflow deadline elapsed
    #[error("operation timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds before the deadline
        seconds: u64,
    },

    /// Environment problem raised by user code
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// Bad data encountered by user code
    #[error("data error: {0}")]
    Data(String),

    /// A downstream API call failed
    #[error("API call failure: {0}")]
    ApiCall(String),

    /// A network operation failed
    #[error("network failure: {0}")]
    Network(String),

    /// Input or payload validation failed
    #[error("data validation failure: {0}")]
    DataValidation(String),

    /// A required dependency was unavailable
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// A node body failed with a non-domain error
    #[error("node '{name}' failed: {message}")]
    NodeFailed {
        /// The failing node name
        name: String,
        /// Error message
        message: String,
    },

    /// Generic failure
    #[error("{0}")]
    Failed(String),
}

impl WorkflowError {
    /// Create a timeout error
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    /// Create an infrastructure error
    pub fn infrastructure<S: Into<String>>(message: S) -> Self {
        Self::Infrastructure(message.into())
    }

    /// Create a data error
    pub fn data<S: Into<String>>(message: S) -> Self {
        Self::Data(message.into())
    }

    /// Create an API call failure
    pub fn api_call<S: Into<String>>(message: S) -> Self {
        Self::ApiCall(message.into())
    }

    /// Create a network failure
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    /// Create a data validation failure
    pub fn data_validation<S: Into<String>>(message: S) -> Self {
        Self::DataValidation(message.into())
    }

    /// Create a dependency-unavailable error
    pub fn dependency_unavailable<S: Into<String>>(message: S) -> Self {
        Self::DependencyUnavailable(message.into())
    }

    /// Create an unsupported-graph-scenario error
    pub fn unsupported_graph_scenario<S: Into<String>>(message: S) -> Self {
        Self::UnsupportedGraphScenario(message.into())
    }

    /// Create a generic failure
    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self::Failed(message.into())
    }

    /// The status code this error resolves to, returned as the CLI exit code
    /// and recorded on the failing execution.
    pub fn exit_code(&self) -> StatusCode {
        match self {
            WorkflowError::DuplicateNode { .. }
            | WorkflowError::UnknownNode { .. }
            | WorkflowError::InvalidNodeName { .. }
            | WorkflowError::InvalidWorkflowName { .. }
            | WorkflowError::SelfLoop { .. }
            | WorkflowError::DuplicateEdge { .. }
            | WorkflowError::Cycle { .. }
            | WorkflowError::NodesNotFound
            | WorkflowError::EmptyExecutionGroup
            | WorkflowError::UnknownGroupNodes { .. }
            | WorkflowError::UnsupportedGraphScenario(_)
            | WorkflowError::DuplicateEndpoint { .. } => StatusCode::PrerequisiteFail,
            WorkflowError::Timeout { .. } => StatusCode::TimedOut,
            WorkflowError::Infrastructure(_) => StatusCode::InfrastructureError,
            WorkflowError::Data(_) => StatusCode::DataError,
            WorkflowError::ApiCall(_) => StatusCode::ApiCallFailure,
            WorkflowError::Network(_) => StatusCode::NetworkFailure,
            WorkflowError::DataValidation(_) => StatusCode::DataValidationFailure,
            WorkflowError::DependencyUnavailable(_) => StatusCode::DependencyUnavailable,
            WorkflowError::NodeFailed { .. } | WorkflowError::Failed(_) => StatusCode::Failed,
        }
    }

    /// The exception class name recorded in per-attempt error records.
    pub fn exception_class_name(&self) -> &'static str {
        match self {
            WorkflowError::Timeout { .. } => "TimeoutException",
            WorkflowError::Infrastructure(_) => "InfrastructureErrorException",
            WorkflowError::Data(_) => "DataErrorException",
            WorkflowError::ApiCall(_) => "APICallFailureException",
            WorkflowError::Network(_) => "NetworkFailureException",
            WorkflowError::DataValidation(_) => "DataValidationFailureException",
            WorkflowError::DependencyUnavailable(_) => "DependencyUnavailableException",
            WorkflowError::NodesNotFound => "NodesNotFoundException",
            WorkflowError::UnsupportedGraphScenario(_) => "UnsupportedGraphScenario",
            WorkflowError::DuplicateNode { .. }
            | WorkflowError::UnknownNode { .. }
            | WorkflowError::InvalidNodeName { .. }
            | WorkflowError::InvalidWorkflowName { .. }
            | WorkflowError::SelfLoop { .. }
            | WorkflowError::DuplicateEdge { .. }
            | WorkflowError::Cycle { .. }
            | WorkflowError::EmptyExecutionGroup
            | WorkflowError::UnknownGroupNodes { .. }
            | WorkflowError::DuplicateEndpoint { .. } => "PrerequisiteFailureException",
            WorkflowError::NodeFailed { .. } | WorkflowError::Failed(_) => "Exception",
        }
    }

    /// Whether the error came from user code (as opposed to a misbuilt graph).
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            WorkflowError::Timeout { .. }
                | WorkflowError::Infrastructure(_)
                | WorkflowError::Data(_)
                | WorkflowError::ApiCall(_)
                | WorkflowError::Network(_)
                | WorkflowError::DataValidation(_)
                | WorkflowError::DependencyUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(WorkflowError::timeout(30).exit_code(), StatusCode::TimedOut);
        assert_eq!(WorkflowError::data("bad row").exit_code(), StatusCode::DataError);
        assert_eq!(
            WorkflowError::NodesNotFound.exit_code(),
            StatusCode::PrerequisiteFail
        );
        assert_eq!(WorkflowError::failed("boom").exit_code(), StatusCode::Failed);
    }

    #[test]
    fn test_exception_class_names() {
        assert_eq!(
            WorkflowError::timeout(1).exception_class_name(),
            "TimeoutException"
        );
        assert_eq!(
            WorkflowError::data("x").exception_class_name(),
            "DataErrorException"
        );
        assert_eq!(WorkflowError::failed("x").exception_class_name(), "Exception");
    }

    #[test]
    fn test_domain_classification() {
        assert!(WorkflowError::network("down").is_domain());
        assert!(!WorkflowError::NodesNotFound.is_domain());
    }
}
