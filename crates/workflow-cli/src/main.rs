//! Run a workflow document from the command line.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{Map, Value};
use workflow_engine::{
    EventError, EventSink, ExecutionContext, ExecutorOptions, GraphExecutor, WorkflowDocument,
    WorkflowEvent,
};

/// Run a workflow from a JSON file
#[derive(Parser, Debug)]
#[command(name = "workflow-run")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the workflow JSON file
    workflow_file: PathBuf,

    /// Initial state variable (can be used multiple times)
    #[arg(short, long = "var", num_args = 2, value_names = ["KEY", "VALUE"])]
    var: Vec<String>,

    /// Path to config JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Abort after this many waves
    #[arg(long)]
    max_waves: Option<u32>,
}

/// Forwards engine events to the log
struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: WorkflowEvent) -> std::result::Result<(), EventError> {
        match &event {
            WorkflowEvent::WaveStarted { wave, nodes, .. } => {
                log::info!("Wave {}: {}", wave, nodes.join(", "));
            }
            WorkflowEvent::NodeFailed { node, error, .. } => {
                log::error!("Node '{}' failed: {}", node, error);
            }
            other => log::debug!("{}", serde_json::to_string(other)?),
        }
        Ok(())
    }
}

/// Parse a `--var` value as JSON, falling back to a plain string.
fn parse_var(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn initial_state(pairs: &[String]) -> Map<String, Value> {
    pairs
        .chunks(2)
        .filter_map(|pair| match pair {
            [key, value] => Some((key.clone(), parse_var(value))),
            _ => None,
        })
        .collect()
}

fn load_config(path: &Path) -> Result<Map<String, Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&text)
        .with_context(|| format!("Config file {} is not valid JSON", path.display()))?;
    match parsed {
        Value::Object(config) => Ok(config),
        _ => bail!("Config file {} must contain a JSON object", path.display()),
    }
}

fn pretty(value: &impl serde::Serialize) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let graph = WorkflowDocument::from_path(&cli.workflow_file)
        .and_then(WorkflowDocument::into_graph)
        .with_context(|| format!("Failed to load workflow {}", cli.workflow_file.display()))?;

    let state = initial_state(&cli.var);
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Map::new(),
    };
    let ctx = ExecutionContext::with_data(state, config);

    println!("Executing workflow: {}", graph.name());
    println!("Initial state: {}", pretty(&ctx.state())?);
    println!("Config: {}", pretty(&ctx.snapshot().config)?);
    println!("{}", "-".repeat(40));

    let executor = GraphExecutor::with_options(ExecutorOptions {
        max_waves: cli.max_waves,
        ..ExecutorOptions::default()
    });
    let outcome = executor.run(&graph, &ctx, &LogEventSink).await;

    println!("{}", "-".repeat(40));
    let snapshot = ctx.snapshot();
    println!("Final state: {}", pretty(&snapshot.state)?);
    println!("Node context: {}", pretty(&snapshot.node_context)?);

    let summary = outcome.context("Workflow execution failed")?;
    log::info!(
        "Execution {} finished in {} waves ({} node visits)",
        summary.execution_id,
        summary.waves,
        summary.nodes_executed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_var_json_or_string() {
        assert_eq!(parse_var("42"), json!(42));
        assert_eq!(parse_var("[1, 2]"), json!([1, 2]));
        assert_eq!(parse_var("true"), json!(true));
        assert_eq!(parse_var("hello"), json!("hello"));
        assert_eq!(parse_var("\"quoted\""), json!("quoted"));
    }

    #[test]
    fn test_cli_collects_var_pairs() {
        let cli = Cli::try_parse_from([
            "workflow-run",
            "flow.json",
            "--var",
            "x",
            "1",
            "-v",
            "name",
            "bob",
            "--max-waves",
            "10",
        ])
        .unwrap();

        assert_eq!(cli.workflow_file, PathBuf::from("flow.json"));
        assert_eq!(cli.max_waves, Some(10));

        let state = initial_state(&cli.var);
        assert_eq!(state["x"], json!(1));
        assert_eq!(state["name"], json!("bob"));
    }

    #[test]
    fn test_var_requires_two_values() {
        assert!(Cli::try_parse_from(["workflow-run", "flow.json", "--var", "x"]).is_err());
    }

    #[test]
    fn test_log_sink_accepts_events() {
        let event = WorkflowEvent::NodeCompleted {
            execution_id: "exec".to_string(),
            wave: 1,
            node: "init".to_string(),
        };
        assert!(LogEventSink.send(event).is_ok());
    }

    #[test]
    fn test_load_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"mode": "strict"}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config["mode"], json!("strict"));
    }

    #[test]
    fn test_config_must_be_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[1, 2]").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("must contain a JSON object"));
    }
}
