//! Node definitions: configuration, the polymorphic body, and the runner.

pub mod execution;

use crate::error::{WorkflowError, WorkflowResult};
use crate::status::StatusCode;
use crate::workflow::WorkflowContext;
use async_trait::async_trait;
use execution::NodeExecution;
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Shared handle to a node.
///
/// Nodes are addressed through `Arc` for the lifetime of a run so that the
/// scheduler and peer nodes (a consumer reading a producer's output) observe
/// the same attempt history.
pub type NodeRef = Arc<Node>;

/// The polymorphic body of a node.
///
/// `run` is one attempt of the node's work; side effects flow through
/// [`Node::set_output`]. The lifecycle hooks default to no-ops; errors raised
/// inside a hook are not caught by the runner.
#[async_trait]
pub trait NodeLogic: Send + Sync + Debug {
    /// Execute one attempt of the node's work.
    async fn run(&self, node: &Node) -> WorkflowResult<()>;

    /// Called when an attempt starts, before the body.
    async fn on_start(&self, _node: &Node) -> WorkflowResult<()> {
        Ok(())
    }

    /// Called after the body returns successfully.
    async fn on_success(&self, _node: &Node) -> WorkflowResult<()> {
        Ok(())
    }

    /// Called after the body fails, before the retry decision.
    async fn on_failure(&self, _node: &Node, _error: &WorkflowError) -> WorkflowResult<()> {
        Ok(())
    }

    /// Called at the end of every attempt, success or failure.
    async fn on_finish(&self, _node: &Node) -> WorkflowResult<()> {
        Ok(())
    }
}

/// Wrap a synchronous closure as a [`NodeLogic`].
///
/// Handy for nodes whose body is a plain function; implement the trait
/// directly when you need async work or lifecycle hooks.
pub fn node_fn<F>(body: F) -> Arc<dyn NodeLogic>
where
    F: Fn(&Node) -> WorkflowResult<()> + Send + Sync + 'static,
{
    Arc::new(FnLogic { body })
}

struct FnLogic<F> {
    body: F,
}

impl<F> Debug for FnLogic<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnLogic").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> NodeLogic for FnLogic<F>
where
    F: Fn(&Node) -> WorkflowResult<()> + Send + Sync + 'static,
{
    async fn run(&self, node: &Node) -> WorkflowResult<()> {
        (self.body)(node)
    }
}

/// Builder for [`Node`] configuration.
#[derive(Debug)]
pub struct NodeBuilder {
    name: String,
    description: Option<String>,
    timeout_seconds: Option<u64>,
    max_retries: u32,
    retry_delay_seconds: u64,
    logic: Arc<dyn NodeLogic>,
}

impl NodeBuilder {
    /// Start building a node with a name and a body.
    pub fn new<S: Into<String>>(name: S, logic: Arc<dyn NodeLogic>) -> Self {
        Self {
            name: name.into(),
            description: None,
            timeout_seconds: None,
            max_retries: 0,
            retry_delay_seconds: 0,
            logic,
        }
    }

    /// Set the description
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the per-attempt deadline in seconds (must be positive)
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the sleep between retries in seconds
    pub fn with_retry_delay(mut self, retry_delay_seconds: u64) -> Self {
        self.retry_delay_seconds = retry_delay_seconds;
        self
    }

    /// Validate the configuration and produce a shareable node.
    pub fn build(self) -> WorkflowResult<NodeRef> {
        if self.name.len() < 3 || self.name.len() > 30 {
            return Err(WorkflowError::InvalidNodeName { name: self.name });
        }
        if self.timeout_seconds == Some(0) {
            return Err(WorkflowError::data_validation(format!(
                "node '{}' timeout_seconds must be positive",
                self.name
            )));
        }
        Ok(Arc::new(Node {
            name: self.name,
            id: Uuid::new_v4(),
            description: self.description,
            timeout_seconds: self.timeout_seconds,
            max_retries: self.max_retries,
            retry_delay_seconds: self.retry_delay_seconds,
            logic: self.logic,
            executions: RwLock::new(Vec::new()),
            context: RwLock::new(None),
        }))
    }
}

/// A single unit of user work: configuration, body, and attempt history.
///
/// The attempt list is written only by the node's own runner; everything else
/// reads it after the runner's task has been joined.
pub struct Node {
    name: String,
    id: Uuid,
    description: Option<String>,
    timeout_seconds: Option<u64>,
    max_retries: u32,
    retry_delay_seconds: u64,
    logic: Arc<dyn NodeLogic>,
    executions: RwLock<Vec<NodeExecution>>,
    context: RwLock<Option<WorkflowContext>>,
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_seconds", &self.retry_delay_seconds)
            .field("attempts", &self.attempt())
            .finish()
    }
}

impl Node {
    /// Build a node with default configuration (no timeout, no retries).
    pub fn new<S: Into<String>>(name: S, logic: Arc<dyn NodeLogic>) -> WorkflowResult<NodeRef> {
        NodeBuilder::new(name, logic).build()
    }

    /// Start a configuration builder.
    pub fn builder<S: Into<String>>(name: S, logic: Arc<dyn NodeLogic>) -> NodeBuilder {
        NodeBuilder::new(name, logic)
    }

    /// The node's unique name within its workflow.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The generated node id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Per-attempt deadline in seconds, if configured.
    pub fn timeout_seconds(&self) -> Option<u64> {
        self.timeout_seconds
    }

    /// Retry budget.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Sleep between retries in seconds.
    pub fn retry_delay_seconds(&self) -> u64 {
        self.retry_delay_seconds
    }

    /// Number of attempts recorded so far.
    pub fn attempt(&self) -> usize {
        self.executions.read().len()
    }

    /// Snapshot of the attempt history.
    pub fn executions(&self) -> Vec<NodeExecution> {
        self.executions.read().clone()
    }

    /// Snapshot of the most recent attempt, if any.
    pub fn last_execution(&self) -> Option<NodeExecution> {
        self.executions.read().last().cloned()
    }

    /// Whether the most recent attempt completed successfully.
    pub fn completed(&self) -> bool {
        self.executions
            .read()
            .last()
            .map(|execution| execution.status == StatusCode::Completed)
            .unwrap_or(false)
    }

    /// Write the current attempt's output container.
    ///
    /// Called from the node body; a no-op when no attempt is open.
    pub fn set_output(&self, output: serde_json::Value) {
        if let Some(execution) = self.executions.write().last_mut() {
            execution.output = output;
        }
    }

    /// The most recent attempt's output container.
    pub fn last_output(&self) -> Option<serde_json::Value> {
        self.executions
            .read()
            .last()
            .map(|execution| execution.output.clone())
    }

    /// Run-wide input, available once the scheduler attached the context.
    pub fn workflow_input(&self) -> Option<crate::workflow::input::WorkflowInput> {
        self.context.read().as_ref().map(|ctx| ctx.input.clone())
    }

    /// Metadata of the workflow attempt this node runs under.
    pub fn workflow_metadata(&self) -> Option<execution::ExecutionTimes> {
        self.context.read().as_ref().map(|ctx| ctx.metadata.clone())
    }

    pub(crate) fn set_workflow_context(&self, context: WorkflowContext) {
        *self.context.write() = Some(context);
    }

    /// Drop the attempt history, called at the start of each workflow attempt.
    pub(crate) fn reset_executions(&self) {
        self.executions.write().clear();
        *self.context.write() = None;
    }

    /// Fresh copy for an independent run: same configuration and body, empty
    /// attempt history.
    pub(crate) fn clone_for_run(&self) -> NodeRef {
        Arc::new(Node {
            name: self.name.clone(),
            id: self.id,
            description: self.description.clone(),
            timeout_seconds: self.timeout_seconds,
            max_retries: self.max_retries,
            retry_delay_seconds: self.retry_delay_seconds,
            logic: Arc::clone(&self.logic),
            executions: RwLock::new(Vec::new()),
            context: RwLock::new(None),
        })
    }

    /// Run the node body until an attempt succeeds or the retry budget is
    /// exhausted.
    ///
    /// Each failed attempt keeps its own execution record; the sleep between
    /// attempts happens after the failed record is finalized.
    pub async fn execute(self: &Arc<Self>) -> WorkflowResult<()> {
        loop {
            self.open_execution();
            let mut result = self.run_attempt().await;
            let mut retry = false;
            if let Err(error) = &result {
                match self.logic.on_failure(self, error).await {
                    Ok(()) => retry = self.should_retry(error),
                    Err(hook_error) => result = Err(hook_error),
                }
            }
            self.close_execution();
            self.logic.on_finish(self).await?;

            match result {
                Ok(()) => return Ok(()),
                Err(_) if retry => {
                    tokio::time::sleep(Duration::from_secs(self.retry_delay_seconds)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn run_attempt(self: &Arc<Self>) -> WorkflowResult<()> {
        self.logic.on_start(self).await?;
        self.run_with_deadline().await?;
        self.logic.on_success(self).await?;
        Ok(())
    }

    /// Run the body on its own task, waiting up to `timeout_seconds`.
    ///
    /// On deadline expiry the worker task is abandoned, not cancelled: the
    /// attempt is recorded as `TIMED_OUT` immediately while the body keeps
    /// running until it naturally ends. Post-deadline writes to shared state
    /// carry no guarantees.
    async fn run_with_deadline(self: &Arc<Self>) -> WorkflowResult<()> {
        let worker = {
            let node = Arc::clone(self);
            tokio::spawn(async move {
                let logic = Arc::clone(&node.logic);
                logic.run(&node).await
            })
        };

        let joined = match self.timeout_seconds {
            Some(seconds) => {
                match tokio::time::timeout(Duration::from_secs(seconds), worker).await {
                    Ok(joined) => joined,
                    Err(_elapsed) => {
                        let error = WorkflowError::timeout(seconds);
                        self.record_failure(&error);
                        return Err(error);
                    }
                }
            }
            None => worker.await,
        };

        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                self.record_failure(&error);
                Err(error)
            }
            Err(join_error) => {
                let error = WorkflowError::NodeFailed {
                    name: self.name.clone(),
                    message: format!("body task aborted: {join_error}"),
                };
                self.record_failure(&error);
                Err(error)
            }
        }
    }

    fn open_execution(&self) {
        self.executions.write().push(NodeExecution::open(&self.name));
    }

    fn close_execution(&self) {
        if let Some(execution) = self.executions.write().last_mut() {
            execution.finalize();
        }
    }

    fn record_failure(&self, error: &WorkflowError) {
        if let Some(execution) = self.executions.write().last_mut() {
            execution.record_failure(error);
        }
    }

    fn should_retry(&self, error: &WorkflowError) -> bool {
        if self.attempt() >= self.max_retries as usize {
            tracing::error!(node = %self.name, error = %error, "retries exhausted");
            return false;
        }
        tracing::warn!(
            node = %self.name,
            error = %error,
            delay_seconds = self.retry_delay_seconds,
            "node failed, retrying"
        );
        true
    }
}
