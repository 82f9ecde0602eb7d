use async_trait::async_trait;

use super::fields::{derive_outputs, resolve_inputs};
use super::kind_mismatch;
use crate::domain::workflow::{
    NodeDefinition, NodeExecution, NodeKind, NodeOutput, NodeRuntime, NodeType, WorkflowError,
};

/// Produces the instance's final output and stops the run
#[derive(Debug, Default)]
pub struct EndRuntime;

#[async_trait]
impl NodeRuntime for EndRuntime {
    fn node_type(&self) -> NodeType {
        NodeType::End
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError> {
        let NodeKind::End(end) = node.kind() else {
            return Err(kind_mismatch(node, NodeType::End));
        };

        let inputs = resolve_inputs(&end.inputs, execution.context)?;
        let output = derive_outputs(&end.outputs, &inputs, execution.context)?;

        Ok(NodeOutput::new(output).terminal())
    }
}
