//! CLI surface: one subcommand per registered endpoint, with options
//! synthesized from the endpoint's input schema.
//!
//! Primitives map to `--kebab-cased-name VALUE`, booleans to a
//! `--flag / --no-flag` pair, arrays to repeatable options. The exit code is
//! the terminal workflow status's numeric value.

use crate::server::Endpoint;
use crate::status::StatusCode;
use crate::workflow::input::{FieldType, InputSchema, Scalar};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Map, Value};

/// Build the root command with one subcommand per endpoint.
pub fn build_command(endpoints: &[Endpoint]) -> Command {
    let mut root = Command::new("flow-graph")
        .about("FlowGraph workflow runner")
        .subcommand_required(true)
        .arg_required_else_help(true);
    for endpoint in endpoints {
        root = root.subcommand(endpoint_command(endpoint));
    }
    root
}

fn endpoint_command(endpoint: &Endpoint) -> Command {
    let mut command = Command::new(endpoint.name.clone())
        .about(format!("Execute the {} workflow.", endpoint.name));

    for field in endpoint.schema.fields() {
        if field.exclude_from_cli {
            continue;
        }
        let cli = field.cli_name();
        match field.ty {
            FieldType::Boolean => {
                let negated_id = format!("no_{}", field.name);
                command = command
                    .arg(
                        Arg::new(field.name.clone())
                            .long(cli.clone())
                            .action(ArgAction::SetTrue)
                            .help(field.help.clone())
                            .overrides_with(negated_id.clone()),
                    )
                    .arg(
                        Arg::new(negated_id)
                            .long(format!("no-{cli}"))
                            .action(ArgAction::SetTrue)
                            .help(format!("Disable --{cli}"))
                            .overrides_with(field.name.clone()),
                    );
            }
            FieldType::Array(scalar) => {
                let arg = Arg::new(field.name.clone())
                    .long(cli)
                    .action(ArgAction::Append)
                    .help(field.help.clone())
                    .required(field.required && field.default.is_none());
                command = command.arg(scalar_parser(arg, scalar));
            }
            _ => {
                let arg = Arg::new(field.name.clone())
                    .long(cli)
                    .action(ArgAction::Set)
                    .help(field.help.clone())
                    .required(field.required && field.default.is_none());
                command = command.arg(typed_parser(arg, field.ty));
            }
        }
    }
    command
}

fn typed_parser(arg: Arg, ty: FieldType) -> Arg {
    match ty {
        FieldType::Integer => arg.value_parser(clap::value_parser!(i64)),
        FieldType::Number => arg.value_parser(clap::value_parser!(f64)),
        _ => arg.value_parser(clap::value_parser!(String)),
    }
}

fn scalar_parser(arg: Arg, scalar: Scalar) -> Arg {
    match scalar {
        Scalar::Integer => arg.value_parser(clap::value_parser!(i64)),
        Scalar::Number => arg.value_parser(clap::value_parser!(f64)),
        Scalar::String => arg.value_parser(clap::value_parser!(String)),
    }
}

/// Translate parsed matches back into a JSON payload for the input schema.
///
/// Fields the caller did not pass are omitted so the schema's defaults apply.
pub fn collect_values(schema: &InputSchema, matches: &ArgMatches) -> Value {
    let mut object = Map::new();

    for field in schema.fields() {
        if field.exclude_from_cli {
            continue;
        }
        match field.ty {
            FieldType::Boolean => {
                if matches.get_flag(&field.name) {
                    object.insert(field.name.clone(), Value::Bool(true));
                } else if matches.get_flag(&format!("no_{}", field.name)) {
                    object.insert(field.name.clone(), Value::Bool(false));
                }
            }
            FieldType::Array(scalar) => {
                let items: Option<Vec<Value>> = match scalar {
                    Scalar::String => matches
                        .get_many::<String>(&field.name)
                        .map(|values| values.map(|value| Value::from(value.clone())).collect()),
                    Scalar::Integer => matches
                        .get_many::<i64>(&field.name)
                        .map(|values| values.map(|value| Value::from(*value)).collect()),
                    Scalar::Number => matches
                        .get_many::<f64>(&field.name)
                        .map(|values| values.map(|value| Value::from(*value)).collect()),
                };
                if let Some(items) = items {
                    object.insert(field.name.clone(), Value::Array(items));
                }
            }
            FieldType::Integer => {
                if let Some(value) = matches.get_one::<i64>(&field.name) {
                    object.insert(field.name.clone(), Value::from(*value));
                }
            }
            FieldType::Number => {
                if let Some(value) = matches.get_one::<f64>(&field.name) {
                    object.insert(field.name.clone(), Value::from(*value));
                }
            }
            FieldType::String => {
                if let Some(value) = matches.get_one::<String>(&field.name) {
                    object.insert(field.name.clone(), Value::from(value.clone()));
                }
            }
        }
    }

    Value::Object(object)
}

/// Execute one endpoint with parsed matches and return the terminal status.
///
/// The endpoint's template is deep-cloned per invocation, exactly like the
/// HTTP path.
pub async fn run_endpoint(endpoint: &Endpoint, matches: &ArgMatches) -> StatusCode {
    let mut values = collect_values(&endpoint.schema, matches);
    if let Value::Object(object) = &mut values {
        object.insert(
            "cli_command_name".to_string(),
            Value::from(endpoint.name.clone()),
        );
    }

    let inputs = match endpoint.schema.build_input(&values) {
        Ok(inputs) => inputs,
        Err(error) => {
            tracing::error!(error = %error, "input validation failed");
            return error.exit_code();
        }
    };

    let mut workflow = endpoint.workflow.deep_clone();
    workflow.inputs = inputs;
    let result = workflow.execute().await;

    match workflow.last_execution() {
        Some(execution) => execution.status,
        None => result
            .err()
            .map(|error| error.exit_code())
            .unwrap_or(StatusCode::Failed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{node_fn, Node};
    use crate::workflow::input::FieldSpec;
    use crate::workflow::Workflow;
    use serde_json::json;
    use std::sync::Arc;

    fn test_endpoint() -> Endpoint {
        let mut workflow = Workflow::new("cli-wf").unwrap();
        workflow
            .add_node(Node::new("only-node", node_fn(|_| Ok(()))).unwrap())
            .unwrap();

        Endpoint {
            name: "sync".to_string(),
            workflow: Arc::new(workflow),
            schema: InputSchema::workflow_defaults()
                .field(FieldSpec::new("dataset", FieldType::String).required())
                .field(FieldSpec::new("tags", FieldType::Array(Scalar::String))),
        }
    }

    #[test]
    fn test_options_are_synthesized() {
        let endpoint = test_endpoint();
        let command = build_command(std::slice::from_ref(&endpoint));

        let matches = command
            .try_get_matches_from([
                "flow-graph",
                "sync",
                "--no-verbose",
                "--max-retries",
                "2",
                "--dataset",
                "eu-rollup",
                "--tags",
                "fast",
                "--tags",
                "eu",
            ])
            .unwrap();

        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "sync");

        let values = collect_values(&endpoint.schema, sub);
        assert_eq!(
            values,
            json!({
                "verbose": false,
                "max_retries": 2,
                "dataset": "eu-rollup",
                "tags": ["fast", "eu"],
            })
        );
    }

    #[test]
    fn test_excluded_fields_have_no_option() {
        let endpoint = test_endpoint();
        let command = build_command(std::slice::from_ref(&endpoint));
        let result =
            command.try_get_matches_from(["flow-graph", "sync", "--cli-command-name", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_required_field_enforced() {
        let endpoint = test_endpoint();
        let command = build_command(std::slice::from_ref(&endpoint));
        let result = command.try_get_matches_from(["flow-graph", "sync"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_endpoint_returns_terminal_status() {
        let endpoint = test_endpoint();
        let command = build_command(std::slice::from_ref(&endpoint));
        let matches = command
            .try_get_matches_from([
                "flow-graph",
                "sync",
                "--no-verbose",
                "--dataset",
                "eu-rollup",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();

        let status = run_endpoint(&endpoint, sub).await;
        assert_eq!(status, StatusCode::Completed);
        assert_eq!(status.value(), 0);
        // the template itself never ran
        assert_eq!(endpoint.workflow.attempt(), 0);
    }
}
