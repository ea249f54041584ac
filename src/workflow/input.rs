//! Workflow input configuration and the declarative schema descriptor that
//! drives the CLI and HTTP surfaces.

use crate::error::{WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Run-wide configuration attached to every workflow execution.
///
/// The core options below are recognized by the engine; user-defined fields
/// land in `extra` and are reachable from node bodies through
/// [`WorkflowInput::get`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    /// CLI command name echoed back in the synthesized command log line
    #[serde(default)]
    pub cli_command_name: Option<String>,
    /// Multi-line banner summaries when true, one-liners when false
    #[serde(default = "default_verbose")]
    pub verbose: bool,
    /// Workflow-level deadline in seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Workflow-level retry budget
    #[serde(default)]
    pub max_retries: u32,
    /// Sleep between workflow retries in seconds
    #[serde(default)]
    pub retry_delay_seconds: u64,
    /// Invoke the docs generator after workflow finalization
    #[serde(default)]
    pub auto_generate_md: bool,
    /// Output path for the generated markdown
    #[serde(default = "default_md_file_path")]
    pub md_file_path: String,
    /// Output path for the generated graph diagram
    #[serde(default = "default_diagram_file_path")]
    pub diagram_file_path: String,
    /// User-defined fields beyond the core options
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_verbose() -> bool {
    true
}

fn default_md_file_path() -> String {
    "workflow_documentation.md".to_string()
}

fn default_diagram_file_path() -> String {
    "workflow_diagram.png".to_string()
}

impl Default for WorkflowInput {
    fn default() -> Self {
        Self {
            cli_command_name: None,
            verbose: true,
            timeout_seconds: None,
            max_retries: 0,
            retry_delay_seconds: 0,
            auto_generate_md: false,
            md_file_path: default_md_file_path(),
            diagram_file_path: default_diagram_file_path(),
            extra: Map::new(),
        }
    }
}

impl WorkflowInput {
    /// Typed accessor for a user-defined field.
    pub fn get<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.extra
            .get(name)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Render the equivalent CLI invocation for log banners.
    ///
    /// Skips fields excluded from the CLI and fields still at their default;
    /// booleans render as `--flag` / `--no-flag`, arrays repeat the option.
    pub fn to_cli_command(&self, schema: &InputSchema) -> String {
        let values = serde_json::to_value(self).unwrap_or(Value::Null);
        let mut flags: Vec<String> = Vec::new();

        for field in schema.fields() {
            if field.exclude_from_cli {
                continue;
            }
            let value = match values.get(&field.name) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            if field.default.as_ref() == Some(value) {
                continue;
            }
            let cli = field.cli_name();
            match value {
                Value::Bool(true) => flags.push(format!("--{cli}")),
                Value::Bool(false) => flags.push(format!("--no-{cli}")),
                Value::Array(items) => {
                    for item in items {
                        flags.push(format!("--{cli} {}", render_scalar(item)));
                    }
                }
                other => flags.push(format!("--{cli} {}", render_scalar(other))),
            }
        }

        let command = self.cli_command_name.as_deref().unwrap_or("<unnamed>");
        format!("{command} {}", flags.join(" "))
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Scalar element type of an array field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    /// UTF-8 text
    String,
    /// Signed integer
    Integer,
    /// Floating-point number
    Number,
}

/// Declared type of an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// UTF-8 text
    String,
    /// Signed integer
    Integer,
    /// Floating-point number
    Number,
    /// Boolean flag
    Boolean,
    /// Repeatable list of scalars
    Array(Scalar),
}

/// One declared input field: the build-time stand-in for runtime schema
/// reflection.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name (snake_case)
    pub name: String,
    /// Declared type
    pub ty: FieldType,
    /// Help text shown by the CLI and the docs generator
    pub help: String,
    /// Default value applied when the field is absent
    pub default: Option<Value>,
    /// Whether the field must be supplied
    pub required: bool,
    /// Omit from generated CLI options
    pub exclude_from_cli: bool,
    /// Omit from generated documentation
    pub exclude_from_docs: bool,
}

impl FieldSpec {
    /// Declare a field with a name and type.
    pub fn new<S: Into<String>>(name: S, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            help: String::new(),
            default: None,
            required: false,
            exclude_from_cli: false,
            exclude_from_docs: false,
        }
    }

    /// Set the help text
    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = help.into();
        self
    }

    /// Set the default value
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark the field required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Omit the field from generated CLI options
    pub fn exclude_from_cli(mut self) -> Self {
        self.exclude_from_cli = true;
        self
    }

    /// Omit the field from generated documentation
    pub fn exclude_from_docs(mut self) -> Self {
        self.exclude_from_docs = true;
        self
    }

    /// The kebab-cased CLI option name.
    pub fn cli_name(&self) -> String {
        self.name.replace('_', "-")
    }

    fn type_matches(&self, value: &Value) -> bool {
        match self.ty {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array(scalar) => value.as_array().map_or(false, |items| {
                items.iter().all(|item| match scalar {
                    Scalar::String => item.is_string(),
                    Scalar::Integer => item.is_i64() || item.is_u64(),
                    Scalar::Number => item.is_number(),
                })
            }),
        }
    }

    fn type_name(&self) -> &'static str {
        match self.ty {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array(_) => "array",
        }
    }
}

/// Declarative description of a workflow's input type.
///
/// Starts from the engine's core options and grows by user-declared fields;
/// drives CLI option synthesis, HTTP payload validation, and documentation
/// tables.
#[derive(Debug, Clone)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    /// The engine's core options with their defaults.
    pub fn workflow_defaults() -> Self {
        Self {
            fields: vec![
                FieldSpec::new("cli_command_name", FieldType::String)
                    .with_help("CLI command name for the workflow.")
                    .exclude_from_cli(),
                FieldSpec::new("verbose", FieldType::Boolean)
                    .with_help("Print more details for debug")
                    .with_default(Value::Bool(true)),
                FieldSpec::new("timeout_seconds", FieldType::Integer)
                    .with_help("Timeout for the workflow in seconds."),
                FieldSpec::new("max_retries", FieldType::Integer)
                    .with_help("Maximum number of run attempts allowed in case of failure.")
                    .with_default(Value::from(0)),
                FieldSpec::new("retry_delay_seconds", FieldType::Integer)
                    .with_help("Delay between retries in seconds.")
                    .with_default(Value::from(0)),
                FieldSpec::new("auto_generate_md", FieldType::Boolean)
                    .with_help("Automatically generate a markdown file documenting the workflow")
                    .with_default(Value::Bool(false)),
                FieldSpec::new("md_file_path", FieldType::String)
                    .with_help("Path to save the generated markdown file.")
                    .with_default(Value::from("workflow_documentation.md")),
                FieldSpec::new("diagram_file_path", FieldType::String)
                    .with_help("Path to save the generated workflow graph diagram image (png).")
                    .with_default(Value::from("workflow_diagram.png")),
            ],
        }
    }

    /// Add a user-declared field.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// All declared fields, core options first.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Check a JSON payload against the declared fields.
    ///
    /// Unknown keys pass through; missing required fields and type
    /// mismatches fail with `DATA_VALIDATION_FAILURE`.
    pub fn validate(&self, values: &Value) -> WorkflowResult<()> {
        let empty = Map::new();
        let object = match values {
            Value::Object(object) => object,
            Value::Null => &empty,
            _ => {
                return Err(WorkflowError::data_validation(
                    "input payload must be a JSON object",
                ))
            }
        };

        for field in &self.fields {
            match object.get(&field.name) {
                Some(Value::Null) | None => {
                    if field.required && field.default.is_none() {
                        return Err(WorkflowError::data_validation(format!(
                            "missing required field '{}'",
                            field.name
                        )));
                    }
                }
                Some(value) => {
                    if !field.type_matches(value) {
                        return Err(WorkflowError::data_validation(format!(
                            "field '{}' must be of type {}",
                            field.name,
                            field.type_name()
                        )));
                    }
                }
            }
        }

        if let Some(Value::Number(timeout)) = object.get("timeout_seconds") {
            if timeout.as_u64().map_or(true, |seconds| seconds == 0) {
                return Err(WorkflowError::data_validation(
                    "timeout_seconds must be a positive integer",
                ));
            }
        }

        Ok(())
    }

    /// Validate a payload and build the resulting [`WorkflowInput`]: core
    /// options are applied directly, user fields land in `extra` with
    /// declared defaults filled in.
    pub fn build_input(&self, values: &Value) -> WorkflowResult<WorkflowInput> {
        self.validate(values)?;

        let mut merged = Map::new();
        for field in &self.fields {
            if let Some(default) = &field.default {
                merged.insert(field.name.clone(), default.clone());
            }
        }
        if let Value::Object(object) = values {
            for (key, value) in object {
                if !value.is_null() {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }

        serde_json::from_value(Value::Object(merged))
            .map_err(|error| WorkflowError::data_validation(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let input = WorkflowInput::default();
        assert!(input.verbose);
        assert_eq!(input.max_retries, 0);
        assert_eq!(input.md_file_path, "workflow_documentation.md");
        assert!(input.timeout_seconds.is_none());
    }

    #[test]
    fn test_build_input_from_payload() {
        let schema = InputSchema::workflow_defaults()
            .field(FieldSpec::new("batch_size", FieldType::Integer).with_default(json!(100)));

        let input = schema
            .build_input(&json!({"verbose": false, "timeout_seconds": 30}))
            .unwrap();
        assert!(!input.verbose);
        assert_eq!(input.timeout_seconds, Some(30));
        assert_eq!(input.get::<i64>("batch_size"), Some(100));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let schema = InputSchema::workflow_defaults()
            .field(FieldSpec::new("dataset", FieldType::String).required());

        let error = schema.build_input(&json!({})).unwrap_err();
        assert!(matches!(error, WorkflowError::DataValidation(_)));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let schema = InputSchema::workflow_defaults();
        let error = schema.validate(&json!({"verbose": "yes"})).unwrap_err();
        assert!(matches!(error, WorkflowError::DataValidation(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let schema = InputSchema::workflow_defaults();
        assert!(schema.validate(&json!({"timeout_seconds": 0})).is_err());
        assert!(schema.validate(&json!({"timeout_seconds": 5})).is_ok());
    }

    #[test]
    fn test_cli_command_echo() {
        let schema = InputSchema::workflow_defaults()
            .field(FieldSpec::new("tags", FieldType::Array(Scalar::String)));

        let mut input = WorkflowInput {
            cli_command_name: Some("nightly-sync".to_string()),
            verbose: false,
            max_retries: 2,
            ..WorkflowInput::default()
        };
        input
            .extra
            .insert("tags".to_string(), json!(["fast", "eu"]));

        let command = input.to_cli_command(&schema);
        assert!(command.starts_with("nightly-sync "));
        assert!(command.contains("--no-verbose"));
        assert!(command.contains("--max-retries 2"));
        assert!(command.contains("--tags fast"));
        assert!(command.contains("--tags eu"));
        // excluded from the CLI and left at default, respectively
        assert!(!command.contains("cli-command-name"));
        assert!(!command.contains("--md-file-path"));
    }
}
