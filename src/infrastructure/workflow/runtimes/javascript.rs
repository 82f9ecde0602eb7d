use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::fields::{derive_outputs, resolve_inputs};
use super::{kind_mismatch, require};
use crate::domain::workflow::{
    NodeDefinition, NodeExecution, NodeKind, NodeOutput, NodeRuntime, NodeType, ScriptSandbox,
    WorkflowError,
};

/// Runs the node's script in the sandbox
#[derive(Debug, Default)]
pub struct JavaScriptRuntime {
    sandbox: Option<Arc<dyn ScriptSandbox>>,
}

impl JavaScriptRuntime {
    pub fn new(sandbox: Option<Arc<dyn ScriptSandbox>>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl NodeRuntime for JavaScriptRuntime {
    fn node_type(&self) -> NodeType {
        NodeType::JavaScript
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError> {
        let NodeKind::JavaScript(script) = node.kind() else {
            return Err(kind_mismatch(node, NodeType::JavaScript));
        };
        let sandbox = require(&self.sandbox, "script")?;

        let input = resolve_inputs(&script.inputs, execution.context)?;
        debug!(node_key = node.key(), "Running script");
        let result = sandbox.execute(&script.script, input).await?;

        if script.dynamic_output {
            return Ok(NodeOutput::new(result));
        }
        let output = derive_outputs(&script.outputs, &result, execution.context)?;
        Ok(NodeOutput::new(output))
    }
}
