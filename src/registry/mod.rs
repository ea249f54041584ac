//! In-memory run registry backing the asynchronous submission path.

use crate::error::WorkflowResult;
use crate::status::StatusCode;
use crate::workflow::execution::WorkflowExecution;
use crate::workflow::input::InputSchema;
use crate::workflow::Workflow;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// The registry's view of one submission, exposed over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    /// Generated run id
    pub run_id: String,
    /// Endpoint the run was submitted to
    pub endpoint: String,
    /// Name of the workflow template
    pub workflow_name: String,
    /// Version of the workflow template
    pub workflow_version: Option<String>,
    /// Id of the cloned workflow executing this run
    pub workflow_id: Option<String>,
    /// Status enum name (`"WAITING"`, `"IN_PROGRESS"`, ...)
    pub status: String,
    /// Submission time, ISO-8601 UTC
    pub submitted_at: String,
    /// Execution start time, ISO-8601 UTC
    pub started_at: Option<String>,
    /// Attempt history captured when the run finishes
    pub executions: Option<Vec<WorkflowExecution>>,
    /// Stringified error when the run failed
    pub error: Option<String>,
}

/// Process-local, non-durable map of run id to run record.
///
/// Written by submitters and by one background task per run; reads are
/// concurrent with writes. No eviction; scope the registry's lifetime to the
/// process.
#[derive(Debug, Default, Clone)]
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<String, RunRecord>>>,
}

impl RunRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a run: validate the payload, deep-clone the template, record a
    /// `WAITING` entry, and spawn the execution in the background.
    ///
    /// Validation failures surface synchronously; the returned record is the
    /// submission receipt regardless of the eventual outcome.
    pub async fn submit(
        &self,
        endpoint: &str,
        template: &Workflow,
        schema: &InputSchema,
        values: &serde_json::Value,
    ) -> WorkflowResult<RunRecord> {
        let inputs = schema.build_input(values)?;

        let mut workflow = template.deep_clone();
        workflow.inputs = inputs;

        let run_id = Uuid::new_v4().to_string();
        let record = RunRecord {
            run_id: run_id.clone(),
            endpoint: endpoint.to_string(),
            workflow_name: workflow.name().to_string(),
            workflow_version: workflow.version().map(str::to_string),
            workflow_id: Some(workflow.id().to_string()),
            status: StatusCode::Waiting.name().to_string(),
            submitted_at: Utc::now().to_rfc3339(),
            started_at: None,
            executions: None,
            error: None,
        };
        self.runs.write().await.insert(run_id.clone(), record.clone());

        let runs = Arc::clone(&self.runs);
        tokio::spawn(async move {
            {
                let mut map = runs.write().await;
                if let Some(record) = map.get_mut(&run_id) {
                    record.status = StatusCode::InProgress.name().to_string();
                    record.started_at = Some(Utc::now().to_rfc3339());
                }
            }

            let result = workflow.execute().await;

            let mut map = runs.write().await;
            if let Some(record) = map.get_mut(&run_id) {
                record.status = workflow
                    .last_execution()
                    .map(|execution| execution.status)
                    .unwrap_or(StatusCode::Failed)
                    .name()
                    .to_string();
                record.executions = Some(workflow.executions());
                if let Err(error) = result {
                    record.error = Some(error.to_string());
                }
            }
        });

        Ok(record)
    }

    /// Constant-time lookup of a run record.
    pub async fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.read().await.get(run_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{node_fn, Node};
    use serde_json::json;
    use std::time::Duration;

    fn template() -> Workflow {
        let mut workflow = Workflow::new("registry-wf").unwrap();
        workflow
            .add_node(Node::new("only-node", node_fn(|_| Ok(()))).unwrap())
            .unwrap();
        workflow.inputs.verbose = false;
        workflow
    }

    async fn poll_terminal(registry: &RunRegistry, run_id: &str) -> RunRecord {
        for _ in 0..200 {
            if let Some(record) = registry.get(run_id).await {
                if record.status != "WAITING" && record.status != "IN_PROGRESS" {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} never reached a terminal status");
    }

    #[tokio::test]
    async fn test_submit_runs_in_background() {
        let registry = RunRegistry::new();
        let template = template();
        let schema = InputSchema::workflow_defaults();

        let record = registry
            .submit("test", &template, &schema, &json!({"verbose": false}))
            .await
            .unwrap();
        assert_eq!(record.status, "WAITING");
        assert_eq!(record.endpoint, "test");

        let finished = poll_terminal(&registry, &record.run_id).await;
        assert_eq!(finished.status, "COMPLETED");
        assert!(finished.started_at.is_some());
        assert_eq!(finished.executions.unwrap().len(), 1);
        // the template never ran
        assert_eq!(template.attempt(), 0);
    }

    #[tokio::test]
    async fn test_identical_submissions_get_distinct_runs() {
        let registry = RunRegistry::new();
        let template = template();
        let schema = InputSchema::workflow_defaults();
        let payload = json!({"verbose": false});

        let first = registry
            .submit("test", &template, &schema, &payload)
            .await
            .unwrap();
        let second = registry
            .submit("test", &template, &schema, &payload)
            .await
            .unwrap();
        assert_ne!(first.run_id, second.run_id);

        let first = poll_terminal(&registry, &first.run_id).await;
        let second = poll_terminal(&registry, &second.run_id).await;
        assert_eq!(first.status, "COMPLETED");
        assert_eq!(second.status, "COMPLETED");
    }

    #[tokio::test]
    async fn test_invalid_payload_fails_synchronously() {
        let registry = RunRegistry::new();
        let template = template();
        let schema = InputSchema::workflow_defaults();

        let error = registry
            .submit("test", &template, &schema, &json!({"max_retries": "two"}))
            .await
            .unwrap_err();
        assert_eq!(error.exit_code(), StatusCode::DataValidationFailure);
    }

    #[tokio::test]
    async fn test_unknown_run_id() {
        let registry = RunRegistry::new();
        assert!(registry.get("missing").await.is_none());
    }
}
