//! Per-instance execution state

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::variable::{INPUT_PREFIX, SYS_PREFIX};
use crate::domain::expression::{flatten, flatten_into, FlatMap};

/// Output recorded for one executed node
#[derive(Debug, Clone, PartialEq)]
pub struct NodePipeline {
    /// Output flattened without a prefix
    pub variables: FlatMap,

    /// Output as produced by the node
    pub document: Value,
}

/// Workflow execution context holding inputs, system variables and node outputs
///
/// Owned by exactly one running instance; never shared between instances.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    instance_id: String,

    /// Startup parameters, addressed as `input.*`
    runtime_parameters: Map<String, Value>,

    /// Host-provided values, addressed as `sys.*`
    system_variables: Map<String, Value>,

    /// Keys of nodes that completed, in execution order
    executed_node_keys: Vec<String>,

    node_pipelines: HashMap<String, NodePipeline>,

    /// Cumulative flat view of `sys`, `input` and every recorded node output
    flatten_variables: FlatMap,
}

impl WorkflowContext {
    pub fn new(
        instance_id: impl Into<String>,
        runtime_parameters: Map<String, Value>,
        system_variables: Map<String, Value>,
    ) -> Self {
        let mut flatten_variables = FlatMap::new();
        flatten_into(
            SYS_PREFIX,
            &Value::Object(system_variables.clone()),
            &mut flatten_variables,
        );
        flatten_into(
            INPUT_PREFIX,
            &Value::Object(runtime_parameters.clone()),
            &mut flatten_variables,
        );

        Self {
            instance_id: instance_id.into(),
            runtime_parameters,
            system_variables,
            executed_node_keys: Vec::new(),
            node_pipelines: HashMap::new(),
            flatten_variables,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn runtime_parameters(&self) -> &Map<String, Value> {
        &self.runtime_parameters
    }

    pub fn system_variables(&self) -> &Map<String, Value> {
        &self.system_variables
    }

    pub fn executed_node_keys(&self) -> &[String] {
        &self.executed_node_keys
    }

    pub fn is_executed(&self, node_key: &str) -> bool {
        self.executed_node_keys.iter().any(|k| k == node_key)
    }

    pub fn node_pipeline(&self, node_key: &str) -> Option<&NodePipeline> {
        self.node_pipelines.get(node_key)
    }

    /// Output of an executed node
    pub fn node_output(&self, node_key: &str) -> Option<&Value> {
        self.node_pipelines.get(node_key).map(|p| &p.document)
    }

    pub fn flatten_variables(&self) -> &FlatMap {
        &self.flatten_variables
    }

    /// Record a node's output and mark it executed
    ///
    /// Recording the same key again replaces the earlier output without
    /// changing its position in the execution order.
    pub fn record_node_output(&mut self, node_key: &str, output: Value) {
        if self.is_executed(node_key) {
            self.flatten_variables
                .retain(|key, _| !is_under_prefix(key, node_key));
        } else {
            self.executed_node_keys.push(node_key.to_string());
        }

        flatten_into(node_key, &output, &mut self.flatten_variables);
        self.node_pipelines.insert(
            node_key.to_string(),
            NodePipeline {
                variables: flatten("", &output),
                document: output,
            },
        );
    }

    #[cfg(test)]
    pub(crate) fn insert_flat_variable(&mut self, key: &str, value: Value) {
        self.flatten_variables.insert(key.to_string(), value);
    }

    /// Nested document of everything visible to the instance:
    /// `{"sys": .., "input": .., "<nodeKey>": ..}`
    pub fn document(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            SYS_PREFIX.to_string(),
            Value::Object(self.system_variables.clone()),
        );
        root.insert(
            INPUT_PREFIX.to_string(),
            Value::Object(self.runtime_parameters.clone()),
        );
        for key in &self.executed_node_keys {
            if let Some(pipeline) = self.node_pipelines.get(key) {
                root.insert(key.clone(), pipeline.document.clone());
            }
        }
        Value::Object(root)
    }
}

fn is_under_prefix(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with('['))
}
