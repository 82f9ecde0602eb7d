//! Node runtime contract

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::context::WorkflowContext;
use super::definition::{NodeDefinition, WorkflowDefinition};
use super::error::WorkflowError;
use super::executor::WorkflowProcessingItem;
use super::node_types::NodeType;
use super::registry::NodeRuntimeRegistry;

/// Result of executing one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub output: Value,

    /// Successor picked by the node, overriding its static `next`
    pub next: Option<String>,

    /// Instance completes after this node
    pub terminal: bool,
}

impl NodeOutput {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            next: None,
            terminal: false,
        }
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

/// Sender half of an instance's event stream
#[derive(Debug, Clone)]
pub struct EventSink {
    instance_id: String,
    tx: Option<mpsc::Sender<WorkflowProcessingItem>>,
}

impl EventSink {
    pub fn new(instance_id: impl Into<String>, tx: mpsc::Sender<WorkflowProcessingItem>) -> Self {
        Self {
            instance_id: instance_id.into(),
            tx: Some(tx),
        }
    }

    /// Sink that drops every event
    pub fn discard(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            tx: None,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Deliver an event; a dropped receiver means the consumer went away
    pub async fn emit(&self, item: WorkflowProcessingItem) -> Result<(), WorkflowError> {
        match &self.tx {
            Some(tx) => tx.send(item).await.map_err(|_| WorkflowError::Cancelled),
            None => Ok(()),
        }
    }

    /// Emit a `Running` event carrying partial data for `node`
    pub async fn partial(&self, node: &NodeDefinition, payload: Value) -> Result<(), WorkflowError> {
        self.emit(WorkflowProcessingItem::running(&self.instance_id, node, payload))
            .await
    }
}

/// Limits applied while running one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub max_steps: usize,
    pub max_loop_iterations: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: 200,
            max_loop_iterations: 1000,
        }
    }
}

/// Everything a runtime can see while executing a node
#[derive(Debug, Clone, Copy)]
pub struct NodeExecution<'a> {
    pub definition: &'a WorkflowDefinition,
    pub context: &'a WorkflowContext,
    pub registry: &'a NodeRuntimeRegistry,
    pub events: &'a EventSink,
    pub cancel: &'a CancellationToken,
    pub limits: ExecutionLimits,
}

impl<'a> NodeExecution<'a> {
    /// Same execution against a different context
    pub fn with_context(self, context: &'a WorkflowContext) -> Self {
        Self { context, ..self }
    }
}

/// Executes nodes of one type
#[async_trait]
pub trait NodeRuntime: Send + Sync + Debug {
    fn node_type(&self) -> NodeType;

    /// Execute `node`; must not mutate the context
    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError>;
}
