//! The scheduling loop that drives a single workflow attempt.

use crate::error::{WorkflowError, WorkflowResult};
use crate::graph::NodeEligibility;
use crate::node::NodeRef;
use crate::status::StatusCode;
use crate::workflow::Workflow;
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const CONTROLLER_NAP: Duration = Duration::from_millis(10);

/// Drive the workflow's graph until every reachable node has resolved or a
/// failure kills every execution group.
///
/// State carried across rounds: `scheduled` (names already dispatched or
/// resolved), `completed` (names finished regardless of status), `running`
/// (in-flight tasks), `node_errors` (last error per failed node). Dispatch
/// order within a round is graph-insertion order; completion order is
/// whatever the tasks produce.
pub(crate) async fn run(workflow: &Workflow) -> WorkflowResult<()> {
    let graph = workflow.graph();
    let mut scheduled: HashSet<String> = HashSet::new();
    let mut completed: HashSet<String> = HashSet::new();
    let mut running: HashMap<String, JoinHandle<WorkflowResult<()>>> = HashMap::new();
    let mut node_errors: HashMap<String, WorkflowError> = HashMap::new();

    loop {
        // Eligibility is asked at most once per round per undispatched node;
        // conditions may have side effects.
        let mut runnable: Vec<NodeRef> = Vec::new();
        let mut newly_skipped = 0usize;
        for node in graph.nodes() {
            if scheduled.contains(node.name()) {
                continue;
            }
            match graph.eligibility(node.name(), &completed) {
                NodeEligibility::Runnable => runnable.push(Arc::clone(node)),
                NodeEligibility::Skipped => {
                    // Resolved without running: descendants over plain edges
                    // see it as done, completed-guards skip transitively.
                    scheduled.insert(node.name().to_string());
                    completed.insert(node.name().to_string());
                    newly_skipped += 1;
                    tracing::debug!(
                        node = %node.name(),
                        "guarding condition evaluated false, node resolved as skipped"
                    );
                }
                NodeEligibility::Blocked => {}
            }
        }

        if runnable.is_empty() && newly_skipped == 0 && running.is_empty() {
            break;
        }

        // Dispatching a node while one of its children runs cannot happen in
        // an acyclic graph; guard it explicitly anyway.
        for node in &runnable {
            if graph
                .children(node.name())
                .iter()
                .any(|child| running.contains_key(child.name()))
            {
                return Err(WorkflowError::unsupported_graph_scenario(
                    "attempted to start a node while one of its children is running",
                ));
            }
        }

        for node in runnable {
            workflow.prepare_node(&node);
            scheduled.insert(node.name().to_string());
            let task_node = Arc::clone(&node);
            let handle = tokio::spawn(async move { task_node.execute().await });
            running.insert(node.name().to_string(), handle);
        }

        let finished: Vec<String> = running
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        for name in finished {
            if let Some(handle) = running.remove(&name) {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        node_errors.insert(name.clone(), error);
                    }
                    Err(join_error) => {
                        node_errors.insert(
                            name.clone(),
                            WorkflowError::failed(format!(
                                "node task '{name}' aborted: {join_error}"
                            )),
                        );
                    }
                }
            }
            completed.insert(name.clone());

            let node = match graph.node(&name) {
                Some(node) => Arc::clone(node),
                None => continue,
            };
            if let Some(node_execution) = node.last_execution() {
                workflow.record_node_execution(node_execution);
            }
            workflow.log_node_summary(&node);

            let node_failed = node
                .last_execution()
                .map(|execution| execution.status != StatusCode::Completed)
                .unwrap_or(false);
            if node_failed && all_groups_dead(workflow) {
                return Err(node_errors.remove(&name).unwrap_or_else(|| {
                    WorkflowError::NodeFailed {
                        name: name.clone(),
                        message: "node finished with a non-completed status".to_string(),
                    }
                }));
            }
        }

        if !running.is_empty() {
            tokio::time::sleep(CONTROLLER_NAP).await;
        }
    }

    Ok(())
}

/// A group is dead once any member has a terminated attempt with a
/// non-`COMPLETED` status; the workflow aborts only when every group is dead.
/// No declared groups behaves as one implicit group holding every node.
fn all_groups_dead(workflow: &Workflow) -> bool {
    let graph = workflow.graph();
    let declared = workflow.execution_groups();

    let implicit: Vec<IndexSet<String>>;
    let groups: &[IndexSet<String>] = if declared.is_empty() {
        implicit = vec![graph.node_names().map(str::to_string).collect()];
        &implicit
    } else {
        declared
    };

    groups.iter().all(|group| {
        group.iter().any(|name| {
            graph
                .node(name)
                .and_then(|node| node.last_execution())
                .map(|execution| {
                    execution.status.is_terminal() && execution.status != StatusCode::Completed
                })
                .unwrap_or(false)
        })
    })
}
