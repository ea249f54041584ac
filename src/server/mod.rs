//! HTTP surface: asynchronous workflow submission and run polling.
//!
//! Routes:
//! - `POST /{endpoint}/run` — submit a run, `202` with the submission receipt
//! - `GET /runs/{run_id}` — poll a run record, `404` if unknown
//! - `GET /{endpoint}/runs/{run_id}` — same, also `404` on endpoint mismatch
//! - `GET /health` — liveness probe

use crate::registry::RunRegistry;
use crate::workflow::input::InputSchema;
use crate::workflow::Workflow;
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use warp::http::StatusCode as HttpStatus;
use warp::{Filter, Rejection, Reply};

/// A registered submission endpoint: a workflow template plus the input
/// schema used to validate payloads and synthesize CLI options.
#[derive(Debug)]
pub struct Endpoint {
    /// URL path segment and CLI subcommand name
    pub name: String,
    /// Pre-built workflow template, deep-cloned per run
    pub workflow: Arc<Workflow>,
    /// Declared input schema
    pub schema: InputSchema,
}

/// Server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

type EndpointMap = Arc<HashMap<String, Endpoint>>;

fn with_registry(
    registry: RunRegistry,
) -> impl Filter<Extract = (RunRegistry,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || registry.clone())
}

fn with_endpoints(
    endpoints: EndpointMap,
) -> impl Filter<Extract = (EndpointMap,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || Arc::clone(&endpoints))
}

/// Build the route tree for a set of endpoints.
pub fn routes(
    endpoints: EndpointMap,
    registry: RunRegistry,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({"status": "ok"})));

    let get_run = warp::path!("runs" / String)
        .and(warp::get())
        .and(with_registry(registry.clone()))
        .and_then(get_run_handler);

    let get_run_by_endpoint = warp::path!(String / "runs" / String)
        .and(warp::get())
        .and(with_registry(registry.clone()))
        .and_then(get_run_by_endpoint_handler);

    let submit = warp::path!(String / "run")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_endpoints(endpoints))
        .and(with_registry(registry))
        .and_then(submit_handler);

    health.or(get_run).or(submit).or(get_run_by_endpoint)
}

async fn submit_handler(
    endpoint: String,
    payload: serde_json::Value,
    endpoints: EndpointMap,
    registry: RunRegistry,
) -> Result<impl Reply, Rejection> {
    let registered = match endpoints.get(&endpoint) {
        Some(registered) => registered,
        None => {
            return Ok(warp::reply::with_status(
                warp::reply::json(&json!({"detail": "Endpoint not found"})),
                HttpStatus::NOT_FOUND,
            ))
        }
    };

    match registry
        .submit(&endpoint, &registered.workflow, &registered.schema, &payload)
        .await
    {
        Ok(record) => Ok(warp::reply::with_status(
            warp::reply::json(&record),
            HttpStatus::ACCEPTED,
        )),
        Err(error) => Ok(warp::reply::with_status(
            warp::reply::json(&json!({"detail": error.to_string()})),
            HttpStatus::UNPROCESSABLE_ENTITY,
        )),
    }
}

async fn get_run_handler(
    run_id: String,
    registry: RunRegistry,
) -> Result<impl Reply, Rejection> {
    match registry.get(&run_id).await {
        Some(record) => Ok(warp::reply::with_status(
            warp::reply::json(&record),
            HttpStatus::OK,
        )),
        None => Ok(warp::reply::with_status(
            warp::reply::json(&json!({"detail": "Run not found"})),
            HttpStatus::NOT_FOUND,
        )),
    }
}

async fn get_run_by_endpoint_handler(
    endpoint: String,
    run_id: String,
    registry: RunRegistry,
) -> Result<impl Reply, Rejection> {
    match registry.get(&run_id).await {
        Some(record) if record.endpoint == endpoint => Ok(warp::reply::with_status(
            warp::reply::json(&record),
            HttpStatus::OK,
        )),
        _ => Ok(warp::reply::with_status(
            warp::reply::json(&json!({"detail": "Run not found"})),
            HttpStatus::NOT_FOUND,
        )),
    }
}

/// Build the endpoint map and serve the API until the process exits.
pub async fn serve(endpoints: Vec<Endpoint>, registry: RunRegistry, config: ServerConfig) {
    let map: HashMap<String, Endpoint> = endpoints
        .into_iter()
        .map(|endpoint| (endpoint.name.clone(), endpoint))
        .collect();

    let host: IpAddr = config.host.parse().unwrap_or_else(|_| {
        tracing::warn!(host = %config.host, "invalid bind address, falling back to 127.0.0.1");
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    });
    let addr = SocketAddr::new(host, config.port);

    tracing::info!(%addr, "serving workflow API");
    warp::serve(routes(Arc::new(map), registry)).run(addr).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{node_fn, Node};

    fn test_endpoints() -> EndpointMap {
        let mut workflow = Workflow::new("http-wf").unwrap();
        workflow
            .add_node(Node::new("only-node", node_fn(|_| Ok(()))).unwrap())
            .unwrap();
        workflow.inputs.verbose = false;

        let mut map = HashMap::new();
        map.insert(
            "test".to_string(),
            Endpoint {
                name: "test".to_string(),
                workflow: Arc::new(workflow),
                schema: InputSchema::workflow_defaults(),
            },
        );
        Arc::new(map)
    }

    #[tokio::test]
    async fn test_health() {
        let routes = routes(test_endpoints(), RunRegistry::new());
        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_run_is_404() {
        let routes = routes(test_endpoints(), RunRegistry::new());
        let response = warp::test::request()
            .method("GET")
            .path("/runs/does-not-exist")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_submit_to_unknown_endpoint_is_404() {
        let routes = routes(test_endpoints(), RunRegistry::new());
        let response = warp::test::request()
            .method("POST")
            .path("/ghost/run")
            .json(&json!({}))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_422() {
        let routes = routes(test_endpoints(), RunRegistry::new());
        let response = warp::test::request()
            .method("POST")
            .path("/test/run")
            .json(&json!({"timeout_seconds": 0}))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 422);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert!(body["detail"].as_str().unwrap().contains("timeout_seconds"));
    }
}
