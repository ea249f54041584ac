//! Application host: endpoint registration and argv dispatch.
//!
//! One registered endpoint serves both surfaces: a CLI subcommand (argv has a
//! subcommand) and an HTTP submission route (empty argv).

use crate::cli;
use crate::error::{WorkflowError, WorkflowResult};
use crate::registry::RunRegistry;
use crate::server::{self, Endpoint, ServerConfig};
use crate::status::StatusCode;
use crate::workflow::input::InputSchema;
use crate::workflow::Workflow;
use std::ffi::OsString;
use std::sync::Arc;

/// Hosts a set of `(endpoint, workflow template, input schema)` triples and
/// dispatches between the CLI and HTTP surfaces.
#[derive(Debug, Default)]
pub struct App {
    endpoints: Vec<Endpoint>,
    registry: RunRegistry,
    server: ServerConfig,
}

impl App {
    /// Create an empty application.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint; the name becomes both the CLI subcommand and the
    /// HTTP path segment.
    pub fn add_endpoint<S: Into<String>>(
        &mut self,
        name: S,
        workflow: Workflow,
        schema: InputSchema,
    ) -> WorkflowResult<()> {
        let name = name.into();
        if self.endpoints.iter().any(|endpoint| endpoint.name == name) {
            return Err(WorkflowError::DuplicateEndpoint { name });
        }
        self.endpoints.push(Endpoint {
            name,
            workflow: Arc::new(workflow),
            schema,
        });
        Ok(())
    }

    /// Override the HTTP bind configuration.
    pub fn configure_server(&mut self, config: ServerConfig) {
        self.server = config;
    }

    /// Dispatch on argv: a subcommand runs one workflow synchronously and
    /// exits with its status value; an empty argv serves the HTTP API.
    pub async fn run(self) -> WorkflowResult<()> {
        let argv: Vec<OsString> = std::env::args_os().collect();
        if argv.len() > 1 {
            let status = self.run_cli(argv).await;
            std::process::exit(status.value() as i32);
        }
        self.run_server().await;
        Ok(())
    }

    /// Run the CLI surface against an explicit argv and return the terminal
    /// status instead of exiting, which keeps the path testable.
    pub async fn run_cli<I, T>(&self, argv: I) -> StatusCode
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let command = cli::build_command(&self.endpoints);
        let matches = match command.try_get_matches_from(argv) {
            Ok(matches) => matches,
            Err(error) => {
                let displayed = matches!(
                    error.kind(),
                    clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
                );
                let _ = error.print();
                return if displayed {
                    StatusCode::Completed
                } else {
                    StatusCode::PrerequisiteFail
                };
            }
        };

        match matches.subcommand() {
            Some((name, sub_matches)) => {
                match self.endpoints.iter().find(|endpoint| endpoint.name == name) {
                    Some(endpoint) => cli::run_endpoint(endpoint, sub_matches).await,
                    None => StatusCode::PrerequisiteFail,
                }
            }
            None => StatusCode::PrerequisiteFail,
        }
    }

    /// Serve the HTTP API until the process exits.
    pub async fn run_server(self) {
        server::serve(self.endpoints, self.registry, self.server).await;
    }
}
