//! Workflow: build API, execution groups, and the retrying executor.

pub mod execution;
pub mod input;
pub(crate) mod scheduler;

use crate::docs;
use crate::error::{WorkflowError, WorkflowResult};
use crate::graph::WorkflowGraph;
use crate::node::execution::{ExecutionTimes, NodeExecution};
use crate::node::NodeRef;
use crate::status::StatusCode;
use async_trait::async_trait;
use execution::WorkflowExecution;
use indexmap::IndexSet;
use input::{InputSchema, WorkflowInput};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Run-wide context attached to every node before its body is invoked.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    /// The workflow's input configuration
    pub input: WorkflowInput,
    /// Metadata of the workflow attempt the node runs under
    pub metadata: ExecutionTimes,
}

/// Overridable workflow lifecycle hooks.
///
/// Defaults are no-ops; errors raised inside a hook are not caught by the
/// executor.
#[async_trait]
pub trait WorkflowHooks: Send + Sync + Debug {
    /// Called when a workflow attempt starts.
    async fn on_start(&self, _workflow: &Workflow) -> WorkflowResult<()> {
        Ok(())
    }

    /// Called when a workflow attempt completes successfully.
    async fn on_success(&self, _workflow: &Workflow) -> WorkflowResult<()> {
        Ok(())
    }

    /// Called when a workflow attempt fails, before the retry decision.
    async fn on_failure(&self, _workflow: &Workflow, _error: &WorkflowError) -> WorkflowResult<()> {
        Ok(())
    }

    /// Called at the end of every workflow attempt, success or failure.
    async fn on_finish(&self, _workflow: &Workflow) -> WorkflowResult<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct NoHooks;

#[async_trait]
impl WorkflowHooks for NoHooks {}

/// A DAG of nodes with execution groups, input configuration, and an
/// append-only attempt history.
pub struct Workflow {
    name: String,
    id: Uuid,
    version: Option<String>,
    description: Option<String>,
    /// Run-wide configuration; replaced per run by the CLI and HTTP paths
    pub inputs: WorkflowInput,
    graph: WorkflowGraph,
    execution_groups: Vec<IndexSet<String>>,
    executions: RwLock<Vec<WorkflowExecution>>,
    hooks: Arc<dyn WorkflowHooks>,
}

impl Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("version", &self.version)
            .field("nodes", &self.graph.len())
            .field("execution_groups", &self.execution_groups.len())
            .field("attempts", &self.attempt())
            .finish()
    }
}

impl Workflow {
    /// Create a workflow; the name must be between 2 and 64 characters.
    pub fn new<S: Into<String>>(name: S) -> WorkflowResult<Self> {
        let name = name.into();
        if name.len() < 2 || name.len() > 64 {
            return Err(WorkflowError::InvalidWorkflowName { name });
        }
        Ok(Self {
            name,
            id: Uuid::new_v4(),
            version: None,
            description: None,
            inputs: WorkflowInput::default(),
            graph: WorkflowGraph::new(),
            execution_groups: Vec::new(),
            executions: RwLock::new(Vec::new()),
            hooks: Arc::new(NoHooks),
        })
    }

    /// Set the description
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the version
    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the input configuration
    pub fn with_inputs(mut self, inputs: WorkflowInput) -> Self {
        self.inputs = inputs;
        self
    }

    /// Install lifecycle hooks
    pub fn with_hooks<H: WorkflowHooks + 'static>(mut self, hooks: H) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// The workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The generated workflow id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Optional version.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: NodeRef) -> WorkflowResult<()> {
        self.graph.add_node(node)
    }

    /// Add an unconditional dependency edge.
    pub fn add_edge(&mut self, source: &str, destination: &str) -> WorkflowResult<()> {
        self.graph.add_edge(source, destination)
    }

    /// Add an edge guarded by a user predicate.
    pub fn add_conditional_edge<F>(
        &mut self,
        source: &str,
        destination: &str,
        condition: F,
    ) -> WorkflowResult<()>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.graph.add_conditional_edge(source, destination, condition)
    }

    /// Add an edge that only lets the destination run when the source
    /// completed successfully.
    pub fn add_edge_if_source_completed(
        &mut self,
        source: &str,
        destination: &str,
    ) -> WorkflowResult<()> {
        self.graph.add_edge_if_source_completed(source, destination)
    }

    /// Declare an execution group: a non-empty set of node names the caller
    /// cares about succeeding. The workflow aborts only when every declared
    /// group holds at least one failed node.
    pub fn add_execution_group<I, S>(&mut self, nodes: I) -> WorkflowResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group: IndexSet<String> = nodes.into_iter().map(Into::into).collect();
        if group.is_empty() {
            return Err(WorkflowError::EmptyExecutionGroup);
        }
        let mut missing: Vec<String> = group
            .iter()
            .filter(|name| self.graph.node(name).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(WorkflowError::UnknownGroupNodes { names: missing });
        }
        self.execution_groups.push(group);
        Ok(())
    }

    /// The underlying graph.
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<NodeRef> {
        self.graph.node(name).cloned()
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> Vec<NodeRef> {
        self.graph.nodes().cloned().collect()
    }

    /// Declared execution groups, in declaration order.
    pub fn execution_groups(&self) -> &[IndexSet<String>] {
        &self.execution_groups
    }

    /// Number of workflow attempts recorded so far.
    pub fn attempt(&self) -> usize {
        self.executions.read().len()
    }

    /// Snapshot of the attempt history.
    pub fn executions(&self) -> Vec<WorkflowExecution> {
        self.executions.read().clone()
    }

    /// Snapshot of the most recent attempt, if any.
    pub fn last_execution(&self) -> Option<WorkflowExecution> {
        self.executions.read().last().cloned()
    }

    /// Independent copy for a new run: same configuration, fresh graph state,
    /// empty attempt history.
    pub fn deep_clone(&self) -> Workflow {
        Workflow {
            name: self.name.clone(),
            id: self.id,
            version: self.version.clone(),
            description: self.description.clone(),
            inputs: self.inputs.clone(),
            graph: self.graph.clone_for_run(),
            execution_groups: self.execution_groups.clone(),
            executions: RwLock::new(Vec::new()),
            hooks: Arc::clone(&self.hooks),
        }
    }

    /// Execute the workflow until an attempt succeeds or the workflow retry
    /// budget is exhausted.
    ///
    /// Each attempt runs the scheduling loop under the workflow deadline;
    /// node execution lists are reset at the start of every attempt so each
    /// attempt observes a clean graph.
    pub async fn execute(&self) -> WorkflowResult<()> {
        let result = self.execute_attempts().await;
        self.finalize_workflow();
        result
    }

    async fn execute_attempts(&self) -> WorkflowResult<()> {
        if self.graph.is_empty() {
            return Err(WorkflowError::NodesNotFound);
        }

        self.log_workflow_start();
        loop {
            self.graph.reset_run_state();
            self.open_execution();

            let mut result = self.run_attempt().await;
            let mut retry = false;
            if let Err(error) = &result {
                match self.hooks.on_failure(self, error).await {
                    Ok(()) => retry = self.should_retry(error),
                    Err(hook_error) => result = Err(hook_error),
                }
            }
            self.close_execution();
            self.hooks.on_finish(self).await?;

            match result {
                Ok(()) => return Ok(()),
                Err(_) if retry => {
                    tokio::time::sleep(Duration::from_secs(self.inputs.retry_delay_seconds)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn run_attempt(&self) -> WorkflowResult<()> {
        self.hooks.on_start(self).await?;

        let result = match self.inputs.timeout_seconds {
            Some(seconds) => {
                match tokio::time::timeout(Duration::from_secs(seconds), scheduler::run(self)).await
                {
                    Ok(result) => result,
                    // in-flight node tasks are abandoned, not cancelled
                    Err(_elapsed) => Err(WorkflowError::timeout(seconds)),
                }
            }
            None => scheduler::run(self).await,
        };

        match result {
            Ok(()) => {
                self.hooks.on_success(self).await?;
                Ok(())
            }
            Err(error) => {
                self.record_attempt_failure(&error);
                Err(error)
            }
        }
    }

    fn should_retry(&self, error: &WorkflowError) -> bool {
        if self.attempt() >= self.inputs.max_retries as usize {
            tracing::error!(workflow = %self.name, error = %error, "retries exhausted");
            return false;
        }
        tracing::warn!(
            workflow = %self.name,
            error = %error,
            delay_seconds = self.inputs.retry_delay_seconds,
            "workflow failed, retrying"
        );
        true
    }

    fn open_execution(&self) {
        let attempt = self.attempt() + 1;
        self.executions.write().push(WorkflowExecution::open(attempt));
    }

    fn close_execution(&self) {
        if let Some(execution) = self.executions.write().last_mut() {
            execution.finalize();
        }
    }

    fn record_attempt_failure(&self, error: &WorkflowError) {
        if let Some(execution) = self.executions.write().last_mut() {
            execution.record_failure(error);
        }
    }

    /// Metadata of the current attempt, cloned out of the lock.
    fn current_metadata(&self) -> ExecutionTimes {
        self.executions
            .read()
            .last()
            .map(|execution| execution.times.clone())
            .unwrap_or_default()
    }

    /// Attach the run-wide context to a node and log its dispatch.
    pub(crate) fn prepare_node(&self, node: &NodeRef) {
        node.set_workflow_context(WorkflowContext {
            input: self.inputs.clone(),
            metadata: self.current_metadata(),
        });
        self.log_node_start(node);
    }

    /// Append a reaped node execution to the current attempt's output.
    pub(crate) fn record_node_execution(&self, node_execution: NodeExecution) {
        if let Some(execution) = self.executions.write().last_mut() {
            execution.output.nodes_executions.push(node_execution);
        }
    }

    fn finalize_workflow(&self) {
        self.log_workflow_summary();
        if self.inputs.auto_generate_md {
            docs::generate(self, &self.inputs.md_file_path, &self.inputs.diagram_file_path);
        }
    }

    fn log_workflow_start(&self) {
        if !self.inputs.verbose {
            return;
        }
        let divider = "-".repeat(30);
        let command = self
            .inputs
            .to_cli_command(&InputSchema::workflow_defaults());
        let inputs = serde_json::to_string(&self.inputs).unwrap_or_default();
        let message = format!(
            "{divider}\nExecuting - Workflow: {}, version: {}\nCommand: {command}\nInputs: {inputs}\n{divider}",
            self.name,
            self.version.as_deref().unwrap_or("N/A"),
        );
        tracing::info!("{}", message);
    }

    fn log_workflow_summary(&self) {
        let latest = self.last_execution();

        if !self.inputs.verbose {
            let status = latest
                .as_ref()
                .map(|execution| execution.status)
                .unwrap_or(StatusCode::Unknown);
            let duration = latest
                .as_ref()
                .map(|execution| execution.times.process_time_display())
                .unwrap_or_else(|| "n/a".to_string());
            tracing::info!(
                "Workflow {} finished status={} attempts={} in {}",
                self.name,
                status,
                self.attempt(),
                duration
            );
            return;
        }

        let (metadata, status) = match &latest {
            Some(execution) => (
                serde_json::to_string(&execution.times).unwrap_or_default(),
                execution.status.to_string(),
            ),
            None => ("{}".to_string(), "{}".to_string()),
        };

        let executions = self.executions.read();
        let previous: Vec<String> = executions
            .iter()
            .take(executions.len().saturating_sub(1))
            .enumerate()
            .map(|(index, execution)| {
                format!(
                    "  - Attempt #{}: status={} duration={}",
                    index + 1,
                    execution.status,
                    execution.times.process_time_display()
                )
            })
            .collect();
        drop(executions);

        let previous_section = if previous.is_empty() {
            String::new()
        } else {
            format!("Previous executions:\n{}\n", previous.join("\n"))
        };

        let divider = "-".repeat(30);
        let message = format!(
            "{divider}\nSummary - Workflow: {} - Attempt #{}\nMetadata: {metadata}\nOutput: {status}\n{previous_section}{divider}",
            self.name,
            self.attempt(),
        );
        tracing::info!("{}", message);
    }

    fn log_node_start(&self, node: &NodeRef) {
        if !self.inputs.verbose {
            return;
        }
        let divider = "-".repeat(30);
        let message = format!(
            "{divider}\nExecuting - Node: {}\nNode Configuration:\nTimeout Seconds: {:?}\nRetries: {}, Retry Delay Seconds: {}\n{divider}",
            node.name(),
            node.timeout_seconds(),
            node.max_retries(),
            node.retry_delay_seconds(),
        );
        tracing::info!("{}", message);
    }

    pub(crate) fn log_node_summary(&self, node: &NodeRef) {
        let latest = node.last_execution();

        if !self.inputs.verbose {
            match &latest {
                Some(execution) if execution.status == StatusCode::Completed => {
                    tracing::info!(
                        "Node {} completed in {}",
                        node.name(),
                        execution.times.process_time_display()
                    );
                }
                Some(execution) => {
                    let (class, message) = execution
                        .error
                        .as_ref()
                        .map(|error| {
                            (
                                error.exception_class_name.clone(),
                                error.exception_message.clone(),
                            )
                        })
                        .unwrap_or_default();
                    tracing::info!(
                        "Node {} failed ({}) in {} error={}: {}",
                        node.name(),
                        execution.status,
                        execution.times.process_time_display(),
                        class,
                        message
                    );
                }
                None => tracing::info!("Node {} finished with no execution record", node.name()),
            }
            return;
        }

        let (metadata, output, error) = match &latest {
            Some(execution) => (
                serde_json::to_string(&execution.times).unwrap_or_default(),
                execution.output.to_string(),
                execution
                    .error
                    .as_ref()
                    .map(|error| error.to_string())
                    .unwrap_or_else(|| "None".to_string()),
            ),
            None => ("{}".to_string(), "{}".to_string(), "{}".to_string()),
        };

        let executions = node.executions();
        let previous_failures: Vec<String> = executions
            .iter()
            .take(executions.len().saturating_sub(1))
            .enumerate()
            .filter(|(_, execution)| execution.status != StatusCode::Completed)
            .map(|(index, execution)| {
                let (class, message) = execution
                    .error
                    .as_ref()
                    .map(|error| {
                        (
                            error.exception_class_name.clone(),
                            error.exception_message.clone(),
                        )
                    })
                    .unwrap_or_default();
                format!(
                    "\t\t- Attempt #{}: status={} duration={} error={}: {}",
                    index + 1,
                    execution.status,
                    execution.times.process_time_display(),
                    class,
                    message
                )
            })
            .collect();

        let previous_section = if previous_failures.is_empty() {
            String::new()
        } else {
            format!(
                "Previous execution failures:\n{}\n",
                previous_failures.join("\n")
            )
        };

        let divider = "-".repeat(30);
        let message = format!(
            "{divider}\nSummary - Node: {} - Execution #{}\nMetadata: {metadata}\nOutput: {output}\nError: {error}\n{previous_section}{divider}",
            node.name(),
            node.attempt(),
        );
        tracing::info!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{node_fn, Node};

    fn no_op(name: &str) -> NodeRef {
        Node::new(name, node_fn(|_| Ok(()))).unwrap()
    }

    #[test]
    fn test_workflow_name_validated() {
        assert!(Workflow::new("x").is_err());
        assert!(Workflow::new("ok").is_ok());
    }

    #[test]
    fn test_execution_group_validation() {
        let mut workflow = Workflow::new("group-checks").unwrap();
        workflow.add_node(no_op("node-a")).unwrap();

        let empty: Vec<String> = Vec::new();
        assert!(matches!(
            workflow.add_execution_group(empty).unwrap_err(),
            WorkflowError::EmptyExecutionGroup
        ));
        assert!(matches!(
            workflow.add_execution_group(["ghost"]).unwrap_err(),
            WorkflowError::UnknownGroupNodes { .. }
        ));
        workflow.add_execution_group(["node-a"]).unwrap();
        assert_eq!(workflow.execution_groups().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_graph_fails_prerequisite() {
        let workflow = Workflow::new("empty-graph").unwrap();
        let error = workflow.execute().await.unwrap_err();
        assert!(matches!(error, WorkflowError::NodesNotFound));
        assert_eq!(error.exit_code(), StatusCode::PrerequisiteFail);
        assert!(workflow.last_execution().is_none());
    }

    #[tokio::test]
    async fn test_deep_clone_leaves_template_untouched() {
        let mut workflow = Workflow::new("clone-template").unwrap();
        workflow.add_node(no_op("node-a")).unwrap();
        workflow.inputs.verbose = false;

        let clone = workflow.deep_clone();
        clone.execute().await.unwrap();

        assert_eq!(clone.attempt(), 1);
        assert_eq!(workflow.attempt(), 0);
        assert_eq!(workflow.node("node-a").unwrap().attempt(), 0);
    }
}
