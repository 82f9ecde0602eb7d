//! flowpilot
//!
//! Workflow execution engine for an AI platform. A workflow is a graph of
//! typed nodes (Start, End, Condition, AI question, classification, HTTP,
//! plugin, knowledge-base lookup, JavaScript, For loop); executing an
//! instance walks the graph and yields one processing event per node.

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use infrastructure::http::HttpClient;
use infrastructure::llm::OpenAiProvider;
use infrastructure::workflow::{default_registry, Collaborators, WorkflowExecutorConfig, WorkflowRuntime};
use tracing::{info, warn};

/// Wire the collaborators available from configuration
///
/// The HTTP collaborator is always present; the LLM provider only when an
/// `llm` section is configured. Plugin, knowledge-base and sandbox
/// collaborators are left to embedders.
pub fn build_collaborators(config: &AppConfig) -> anyhow::Result<Collaborators> {
    let http = HttpClient::new(
        Duration::from_secs(config.http.timeout_secs),
        &config.http.user_agent,
    )?;
    let mut collaborators = Collaborators::new().with_http(Arc::new(http));

    match &config.llm {
        Some(llm) => {
            let client = HttpClient::new(
                Duration::from_secs(llm.timeout_secs),
                &config.http.user_agent,
            )?;
            let provider = OpenAiProvider::with_base_url(client, &llm.api_key, &llm.base_url);
            info!(base_url = %llm.base_url, "LLM provider configured");
            collaborators = collaborators.with_llm(Arc::new(provider));
        }
        None => warn!("No llm section configured; AI nodes will fail"),
    }

    Ok(collaborators)
}

/// Build the executor with every node runtime registered
pub fn build_executor(config: &AppConfig) -> anyhow::Result<WorkflowRuntime> {
    let collaborators = build_collaborators(config)?;
    let registry = default_registry(&collaborators);

    let engine = WorkflowExecutorConfig {
        max_steps: config.engine.max_steps,
        max_loop_iterations: config.engine.max_loop_iterations,
        event_buffer: config.engine.event_buffer,
    };

    Ok(WorkflowRuntime::with_config(Arc::new(registry), engine))
}
