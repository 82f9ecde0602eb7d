//! Workflow executor trait and execution event types

use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::definition::{NodeDefinition, WorkflowDefinition};
use super::error::{WorkflowError, WorkflowErrorKind};
use super::node_types::NodeType;

/// Lifecycle state carried by a processing event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    /// Partial progress (stream deltas, loop iterations)
    Running,
    Succeeded,
    Failed,
}

/// Failure details attached to a `Failed` event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeFailure {
    pub kind: WorkflowErrorKind,
    pub message: String,
}

impl From<&WorkflowError> for NodeFailure {
    fn from(error: &WorkflowError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// One event in an instance's execution stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowProcessingItem {
    pub instance_id: String,
    pub node_key: String,
    pub node_type: NodeType,
    pub state: ProcessingState,

    /// Node output on success, partial data while running
    #[serde(default)]
    pub payload: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeFailure>,

    pub timestamp: DateTime<Utc>,
}

impl WorkflowProcessingItem {
    fn new(instance_id: &str, node: &NodeDefinition, state: ProcessingState, payload: Value) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            node_key: node.key().to_string(),
            node_type: node.node_type(),
            state,
            payload,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn running(instance_id: &str, node: &NodeDefinition, payload: Value) -> Self {
        Self::new(instance_id, node, ProcessingState::Running, payload)
    }

    pub fn succeeded(instance_id: &str, node: &NodeDefinition, output: Value) -> Self {
        Self::new(instance_id, node, ProcessingState::Succeeded, output)
    }

    pub fn failed(instance_id: &str, node: &NodeDefinition, error: &WorkflowError) -> Self {
        let mut item = Self::new(instance_id, node, ProcessingState::Failed, Value::Null);
        item.error = Some(error.into());
        item
    }

    pub fn is_terminal_failure(&self) -> bool {
        self.state == ProcessingState::Failed
    }
}

/// Inputs for starting one workflow instance
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub instance_id: String,
    pub startup_parameters: Map<String, Value>,
    pub system_variables: Map<String, Value>,
}

impl ExecutionRequest {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Default::default()
        }
    }

    /// Request with a generated instance id
    pub fn generated() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.startup_parameters = parameters;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.startup_parameters.insert(key.into(), value);
        self
    }

    pub fn with_system_variables(mut self, variables: Map<String, Value>) -> Self {
        self.system_variables = variables;
        self
    }

    pub fn with_system_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.system_variables.insert(key.into(), value);
        self
    }
}

/// Ordered stream of processing events for one instance
pub type WorkflowEventStream = Pin<Box<dyn Stream<Item = WorkflowProcessingItem> + Send>>;

/// Trait for workflow execution
pub trait WorkflowExecutor: Send + Sync + Debug {
    /// Validate `definition` and start an instance
    ///
    /// Events are produced lazily; once `cancel` fires the stream ends and no
    /// further node is started.
    fn execute(
        &self,
        definition: Arc<WorkflowDefinition>,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<WorkflowEventStream, WorkflowError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::node_types::{EndNode, NodeKind};
    use serde_json::json;

    #[test]
    fn test_failed_event_serialization() {
        let node = NodeDefinition::new("end", NodeKind::End(EndNode::new()));
        let item = WorkflowProcessingItem::failed(
            "inst-1",
            &node,
            &WorkflowError::node_not_executed("nodeB"),
        );

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["node_type"], "end");
        assert_eq!(json["error"]["kind"], "node_not_executed");
        assert!(item.is_terminal_failure());
    }

    #[test]
    fn test_succeeded_event_has_no_error() {
        let node = NodeDefinition::new("end", NodeKind::End(EndNode::new()));
        let item = WorkflowProcessingItem::succeeded("inst-1", &node, json!({"ok": true}));

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["state"], "succeeded");
        assert_eq!(json["payload"], json!({"ok": true}));
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_execution_request_builder() {
        let request = ExecutionRequest::new("inst-9")
            .with_parameter("name", json!("Ann"))
            .with_system_variable("user_id", json!("u-1"));

        assert_eq!(request.instance_id, "inst-9");
        assert_eq!(request.startup_parameters["name"], "Ann");
        assert_eq!(request.system_variables["user_id"], "u-1");
        assert!(!ExecutionRequest::generated().instance_id.is_empty());
    }
}
