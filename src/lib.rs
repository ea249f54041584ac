//! # FlowGraph
//!
//! A production-grade DAG workflow engine for Rust.
//!
//! FlowGraph executes a user-defined acyclic graph of nodes with per-node
//! timeouts and retries, conditional edges, and partial-failure tolerance
//! through declared execution groups. One registered workflow serves two
//! surfaces: a synchronous CLI subcommand (the exit code carries the terminal
//! status) and an asynchronous HTTP submission API (fire-and-forget, poll by
//! run id).
//!
//! ## Features
//!
//! - **DAG scheduling**: runnable nodes dispatch concurrently, honoring
//!   dependency edges and optional guard conditions
//! - **Timeouts and retries**: at both node and workflow level; deadline
//!   expiry abandons the runaway body instead of cancelling it
//! - **Execution groups**: declare which sets of nodes must succeed and
//!   tolerate failures everywhere else
//! - **Async by design**: built on tokio
//! - **Observability**: structured tracing throughout, plus an optional
//!   markdown/diagram documentation generator
//!
//! ## Quick Start
//!
//! ```rust
//! use flow_graph::{node_fn, Node, Workflow, WorkflowResult};
//!
//! #[tokio::main]
//! async fn main() -> WorkflowResult<()> {
//!     let mut workflow = Workflow::new("greeting-pipeline")?;
//!     workflow.inputs.verbose = false;
//!
//!     workflow.add_node(Node::new(
//!         "make-greeting",
//!         node_fn(|node| {
//!             node.set_output(serde_json::json!({"text": "hello"}));
//!             Ok(())
//!         }),
//!     )?)?;
//!     workflow.add_node(Node::new("after-greeting", node_fn(|_| Ok(())))?)?;
//!     workflow.add_edge("make-greeting", "after-greeting")?;
//!
//!     workflow.execute().await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod app;
pub mod cli;
pub mod docs;
pub mod error;
pub mod graph;
pub mod node;
pub mod registry;
pub mod server;
pub mod status;
pub mod workflow;

// Re-export core types for convenience
pub use app::App;
pub use error::{WorkflowError, WorkflowResult};
pub use graph::{Edge, EdgeCondition, NodeEligibility, WorkflowGraph};
pub use node::execution::{ExecutionTimes, NodeError, NodeExecution};
pub use node::{node_fn, Node, NodeBuilder, NodeLogic, NodeRef};
pub use registry::{RunRecord, RunRegistry};
pub use server::{Endpoint, ServerConfig};
pub use status::StatusCode;
pub use workflow::execution::{WorkflowExecution, WorkflowOutput};
pub use workflow::input::{FieldSpec, FieldType, InputSchema, Scalar, WorkflowInput};
pub use workflow::{Workflow, WorkflowContext, WorkflowHooks};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for the engine
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
