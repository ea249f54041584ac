//! Workflow documentation generator.
//!
//! Writes a markdown document describing the workflow (configuration, input,
//! latest execution, per-node tables) plus a Graphviz DOT rendering of the
//! graph; when a local `dot` binary is available the DOT file is also
//! rendered to the configured PNG path. The generator is a collaborator of
//! the engine, not a dependency: every failure is swallowed.

use crate::workflow::input::InputSchema;
use crate::workflow::Workflow;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Command;

/// Generate documentation for a workflow; failures are logged and swallowed.
pub fn generate(workflow: &Workflow, md_path: &str, diagram_path: &str) {
    if let Err(error) = try_generate(workflow, md_path, diagram_path) {
        tracing::warn!(error = %error, "documentation generation failed");
    }
}

fn try_generate(workflow: &Workflow, md_path: &str, diagram_path: &str) -> Result<()> {
    let dot_path = sibling_dot_path(diagram_path);
    fs::write(&dot_path, render_dot(workflow))
        .with_context(|| format!("writing diagram source to {dot_path}"))?;
    render_png(&dot_path, diagram_path);

    let markdown = render_markdown(workflow, diagram_path);
    fs::write(md_path, markdown).with_context(|| format!("writing markdown to {md_path}"))?;

    tracing::info!(path = %md_path, "workflow documentation generated");
    Ok(())
}

fn sibling_dot_path(diagram_path: &str) -> String {
    let path = Path::new(diagram_path);
    path.with_extension("dot").to_string_lossy().into_owned()
}

/// Best-effort PNG rendering through a local `dot` binary.
fn render_png(dot_path: &str, png_path: &str) {
    let rendered = Command::new("dot")
        .args(["-Tpng", dot_path, "-o", png_path])
        .status();
    match rendered {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::debug!(%status, "dot exited non-zero, keeping DOT source only"),
        Err(error) => tracing::debug!(%error, "dot binary unavailable, keeping DOT source only"),
    }
}

fn sanitize(value: &str) -> String {
    value
        .replace('\r', "")
        .replace('\n', "<br>")
        .replace('|', "\\|")
        .replace('`', "\\`")
}

fn table_from_pairs(title: &str, rows: &[(String, String)]) -> String {
    let mut table = format!("## {title}\n");
    table.push_str("| Attribute   | Description                                   |\n");
    table.push_str("|-------------|-----------------------------------------------|\n");
    for (key, value) in rows {
        table.push_str(&format!("| **{}**  | {} |\n", sanitize(key), sanitize(value)));
    }
    table
}

fn input_table(workflow: &Workflow) -> String {
    let schema = InputSchema::workflow_defaults();
    let values = serde_json::to_value(&workflow.inputs).unwrap_or(Value::Null);

    let mut table = String::from("## 📝 Workflow Input\n");
    table.push_str("| Attribute | Description | Default | Required | Value |\n");
    table.push_str("|-----------|-------------|---------|----------|-------|\n");

    for field in schema.fields() {
        if field.exclude_from_docs {
            continue;
        }
        let value = values
            .get(&field.name)
            .map(render_value)
            .unwrap_or_else(|| "None".to_string());
        let default = field
            .default
            .as_ref()
            .map(render_value)
            .unwrap_or_else(|| "None".to_string());
        table.push_str(&format!(
            "| **{}** | {} | {} | {} | {} |\n",
            sanitize(&field.cli_name()),
            sanitize(&field.help),
            sanitize(&default),
            field.required,
            sanitize(&value),
        ));
    }

    for (name, value) in &workflow.inputs.extra {
        if schema.get(name).is_some() {
            continue;
        }
        table.push_str(&format!(
            "| **{}** | user-defined | None | False | {} |\n",
            sanitize(name),
            sanitize(&render_value(value)),
        ));
    }

    table
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render_markdown(workflow: &Workflow, diagram_path: &str) -> String {
    let config_rows = vec![
        ("Name".to_string(), workflow.name().to_string()),
        (
            "Description".to_string(),
            workflow.description().unwrap_or("None").to_string(),
        ),
        (
            "Version".to_string(),
            workflow.version().unwrap_or("None").to_string(),
        ),
        (
            "Total Nodes Count".to_string(),
            workflow.nodes().len().to_string(),
        ),
        (
            "Execution Groups Count".to_string(),
            workflow.execution_groups().len().to_string(),
        ),
    ];
    let config_table = table_from_pairs("⚙️ Workflow Configuration", &config_rows);

    let execution_tables = match workflow.last_execution() {
        Some(execution) => {
            let metadata_rows = vec![
                (
                    "Start Time".to_string(),
                    execution
                        .times
                        .start_time
                        .map(|time| time.to_rfc3339())
                        .unwrap_or_else(|| "None".to_string()),
                ),
                (
                    "End Time".to_string(),
                    execution
                        .times
                        .end_time
                        .map(|time| time.to_rfc3339())
                        .unwrap_or_else(|| "None".to_string()),
                ),
                (
                    "Process Time".to_string(),
                    execution.times.process_time_display(),
                ),
            ];
            let output_rows = vec![
                ("Status".to_string(), execution.status.to_string()),
                (
                    "Nodes Executed".to_string(),
                    execution.output.nodes_executions.len().to_string(),
                ),
            ];
            format!(
                "{}{}",
                table_from_pairs("📊 Workflow Metadata", &metadata_rows),
                table_from_pairs("📤 Workflow Output", &output_rows)
            )
        }
        None => table_from_pairs(
            "📊 Workflow Executions",
            &[("Info".to_string(), "No executions yet".to_string())],
        ),
    };

    let node_tables: Vec<String> = workflow
        .nodes()
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let rows = vec![
                ("Name".to_string(), node.name().to_string()),
                (
                    "Description".to_string(),
                    node.description().unwrap_or("None").to_string(),
                ),
                (
                    "Timeout (seconds)".to_string(),
                    node.timeout_seconds()
                        .map(|seconds| seconds.to_string())
                        .unwrap_or_else(|| "None".to_string()),
                ),
                ("Max Retries".to_string(), node.max_retries().to_string()),
                (
                    "Retry delay (seconds)".to_string(),
                    node.retry_delay_seconds().to_string(),
                ),
            ];
            format!(
                "# 👾 Node {}# - {}\n{}",
                index + 1,
                node.name(),
                table_from_pairs(&format!("⚙️ Step {}# - Configuration", index + 1), &rows)
            )
        })
        .collect();

    format!(
        "# 🕹️ Workflow:\n\n{config_table}\n\n{input_table}\n\n{execution_tables}\n\n\
         # 👾 Nodes:\n\n## 🖼️ Nodes Diagram\n\n![Nodes Diagram]({diagram_path})\n\n{nodes}\n",
        input_table = input_table(workflow),
        nodes = node_tables.join("\n\n"),
    )
}

fn render_dot(workflow: &Workflow) -> String {
    let mut dot = String::from("digraph workflow {\n  rankdir=LR;\n  node [shape=box];\n");
    for node in workflow.nodes() {
        dot.push_str(&format!("  \"{}\";\n", node.name()));
    }
    for edge in workflow.graph().edges() {
        if edge.has_condition() {
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\" [style=dashed, label=\"conditional\"];\n",
                edge.source(),
                edge.destination()
            ));
        } else {
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                edge.source(),
                edge.destination()
            ));
        }
    }
    dot.push_str("}\n");
    dot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{node_fn, Node};

    fn documented_workflow() -> Workflow {
        let mut workflow = Workflow::new("docs-wf")
            .unwrap()
            .with_description("generates documentation")
            .with_version("1.2.0");
        workflow
            .add_node(Node::new("first-step", node_fn(|_| Ok(()))).unwrap())
            .unwrap();
        workflow
            .add_node(Node::new("second-step", node_fn(|_| Ok(()))).unwrap())
            .unwrap();
        workflow
            .add_edge_if_source_completed("first-step", "second-step")
            .unwrap();
        workflow
    }

    #[test]
    fn test_markdown_and_dot_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let md_path = dir.path().join("doc.md").to_string_lossy().into_owned();
        let diagram_path = dir.path().join("diagram.png").to_string_lossy().into_owned();

        let workflow = documented_workflow();
        generate(&workflow, &md_path, &diagram_path);

        let markdown = fs::read_to_string(&md_path).unwrap();
        assert!(markdown.contains("docs-wf"));
        assert!(markdown.contains("first-step"));
        assert!(markdown.contains("Execution Groups Count"));

        let dot = fs::read_to_string(dir.path().join("diagram.dot")).unwrap();
        assert!(dot.contains("\"first-step\" -> \"second-step\""));
        assert!(dot.contains("style=dashed"));
    }

    #[test]
    fn test_failures_are_swallowed() {
        let workflow = documented_workflow();
        // an unwritable destination must not panic or propagate
        generate(
            &workflow,
            "/nonexistent-dir/doc.md",
            "/nonexistent-dir/diagram.png",
        );
    }
}
