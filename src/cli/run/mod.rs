//! Run command - executes a definition file and prints events as JSON lines

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::{ExecutionRequest, WorkflowDefinition, WorkflowExecutor};
use crate::infrastructure::logging::init_logging;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to a JSON workflow definition
    #[arg(long, short)]
    pub definition: PathBuf,

    /// Startup parameters as a JSON object
    #[arg(long, short, default_value = "{}")]
    pub input: String,

    /// System variables as a JSON object
    #[arg(long, default_value = "{}")]
    pub system: String,

    #[arg(long)]
    pub instance_id: Option<String>,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    init_logging(&config.logging);

    let raw = tokio::fs::read_to_string(&args.definition)
        .await
        .with_context(|| format!("failed to read {}", args.definition.display()))?;
    let definition: WorkflowDefinition = serde_json::from_str(&raw)
        .with_context(|| format!("invalid workflow definition in {}", args.definition.display()))?;

    let request = match args.instance_id {
        Some(id) => ExecutionRequest::new(id),
        None => ExecutionRequest::generated(),
    }
    .with_parameters(parse_object(&args.input, "--input")?)
    .with_system_variables(parse_object(&args.system, "--system")?);

    let executor = crate::build_executor(&config)?;
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    info!(instance_id = %request.instance_id, workflow_id = definition.id(), "Running workflow");
    let mut events = executor.execute(Arc::new(definition), request, cancel)?;

    let mut failed_at = None;
    while let Some(item) = events.next().await {
        println!("{}", serde_json::to_string(&item)?);
        if item.is_terminal_failure() {
            failed_at = Some(item.node_key);
        }
    }

    match failed_at {
        Some(node_key) => anyhow::bail!("workflow failed at node '{}'", node_key),
        None => Ok(()),
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Received Ctrl+C, cancelling workflow");
        cancel.cancel();
    }
}

fn parse_object(raw: &str, flag: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", flag))? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("{} must be a JSON object, got {}", flag, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object() {
        let map = parse_object(r#"{"name": "Ann", "age": 30}"#, "--input").unwrap();
        assert_eq!(map["name"], "Ann");
        assert_eq!(map["age"], 30);
    }

    #[test]
    fn test_parse_object_rejects_non_objects() {
        let err = parse_object("[1, 2]", "--input").unwrap_err();
        assert!(err.to_string().contains("--input must be a JSON object"));

        assert!(parse_object("{broken", "--system").is_err());
    }
}
